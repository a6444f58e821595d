use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{access, timestamp},
    db::survey::{
        Guidelines, NewSurvey, Response, Summary, Survey, SurveyCore, DEFAULT_MAX_RESPONSES,
    },
    mongodb::{ApiId, Id},
};

/// At most this many permitted domains per survey.
pub const MAX_PERMITTED_DOMAINS: usize = 10;
/// Each permitted domain is at most this many characters.
pub const MAX_DOMAIN_LENGTH: usize = 30;

/// Trim a required text field, rejecting it if nothing is left.
fn required(field: &'static str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::validation(field, "must not be empty"))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Survey guidelines, as exchanged with clients.
///
/// Missing fields deserialize as empty so validation can name them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuidelinesSpec {
    pub question: String,
    pub permitted_domains: Vec<String>,
    pub permitted_responses: String,
    pub summary_instructions: String,
}

impl TryFrom<GuidelinesSpec> for Guidelines {
    type Error = Error;

    fn try_from(spec: GuidelinesSpec) -> Result<Self> {
        let mut permitted_domains = BTreeSet::new();
        for domain in spec.permitted_domains {
            let domain = domain.trim();
            if domain.is_empty() {
                return Err(Error::validation(
                    "permittedDomains",
                    "entries must not be empty",
                ));
            }
            if domain.chars().count() > MAX_DOMAIN_LENGTH {
                return Err(Error::validation(
                    "permittedDomains",
                    format!("'{domain}' is longer than {MAX_DOMAIN_LENGTH} characters"),
                ));
            }
            permitted_domains.insert(domain.to_string());
        }
        if permitted_domains.is_empty() {
            return Err(Error::validation(
                "permittedDomains",
                "at least one domain is required",
            ));
        }
        if permitted_domains.len() > MAX_PERMITTED_DOMAINS {
            return Err(Error::validation(
                "permittedDomains",
                format!("at most {MAX_PERMITTED_DOMAINS} domains are allowed"),
            ));
        }

        Ok(Self {
            question: required("question", spec.question)?,
            permitted_domains,
            permitted_responses: required("permittedResponses", spec.permitted_responses)?,
            summary_instructions: spec.summary_instructions.trim().to_string(),
        })
    }
}

impl From<Guidelines> for GuidelinesSpec {
    fn from(guidelines: Guidelines) -> Self {
        Self {
            question: guidelines.question,
            permitted_domains: guidelines.permitted_domains.into_iter().collect(),
            permitted_responses: guidelines.permitted_responses,
            summary_instructions: guidelines.summary_instructions,
        }
    }
}

/// The stored (millisecond) expiry must still be after the stored `now`, so a
/// survey is never created already expired.
fn check_expiry(expiry_date: DateTime<Utc>, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let stored = timestamp(expiry_date);
    if expiry_date <= now || stored <= timestamp(now) {
        return Err(Error::validation("expiryDate", "must be in the future"));
    }
    Ok(stored)
}

fn check_capacity(max_responses: u32, current: usize) -> Result<u32> {
    if max_responses == 0 {
        return Err(Error::validation("maxResponses", "must be positive"));
    }
    if (max_responses as usize) < current {
        return Err(Error::validation(
            "maxResponses",
            format!("survey already has {current} responses"),
        ));
    }
    Ok(max_responses)
}

/// A survey specification, as submitted by its creator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SurveySpec {
    pub title: String,
    pub area: String,
    pub description: String,
    pub guidelines: GuidelinesSpec,
    pub expiry_date: Option<DateTime<Utc>>,
    pub max_responses: Option<u32>,
}

impl SurveySpec {
    /// Validate this spec and turn it into a new, active survey owned by `creator_id`.
    pub fn into_survey(self, creator_id: Id, now: DateTime<Utc>) -> Result<NewSurvey> {
        let created_at = timestamp(now);
        Ok(NewSurvey {
            title: required("title", self.title)?,
            area: required("area", self.area)?,
            description: self.description.trim().to_string(),
            creator_id,
            guidelines: self.guidelines.try_into()?,
            expiry_date: check_expiry(
                self.expiry_date
                    .ok_or_else(|| Error::validation("expiryDate", "is required"))?,
                now,
            )?,
            is_active: true,
            max_responses: check_capacity(
                self.max_responses.unwrap_or(DEFAULT_MAX_RESPONSES),
                0,
            )?,
            responses: Vec::new(),
            summary: None,
            created_at,
            updated_at: created_at,
        })
    }
}

/// A partial update to a survey's metadata. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SurveyPatch {
    pub title: Option<String>,
    pub area: Option<String>,
    pub description: Option<String>,
    pub guidelines: Option<GuidelinesSpec>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub max_responses: Option<u32>,
    pub is_active: Option<bool>,
}

impl SurveyPatch {
    /// Apply this patch to `survey`. Nothing is modified unless every field is valid.
    ///
    /// A closed survey only accepts patches that reopen it.
    pub fn apply(self, survey: &mut SurveyCore, now: DateTime<Utc>) -> Result<()> {
        if !survey.is_active && self.is_active != Some(true) {
            return Err(Error::SurveyClosed);
        }

        let title = self.title.map(|t| required("title", t)).transpose()?;
        let area = self.area.map(|a| required("area", a)).transpose()?;
        let guidelines = self.guidelines.map(Guidelines::try_from).transpose()?;
        let expiry_date = self
            .expiry_date
            .map(|e| check_expiry(e, now))
            .transpose()?;
        let max_responses = self
            .max_responses
            .map(|m| check_capacity(m, survey.response_count()))
            .transpose()?;

        if let Some(title) = title {
            survey.title = title;
        }
        if let Some(area) = area {
            survey.area = area;
        }
        if let Some(description) = self.description {
            survey.description = description.trim().to_string();
        }
        if let Some(guidelines) = guidelines {
            survey.guidelines = guidelines;
        }
        if let Some(expiry_date) = expiry_date {
            survey.expiry_date = expiry_date;
        }
        if let Some(max_responses) = max_responses {
            survey.max_responses = max_responses;
        }
        if let Some(is_active) = self.is_active {
            survey.is_active = is_active;
        }
        survey.updated_at = timestamp(now);
        Ok(())
    }
}

/// A response, as shown to its author or the survey's creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDescription {
    pub id: ApiId,
    pub user_id: ApiId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Response> for ResponseDescription {
    fn from(response: &Response) -> Self {
        Self {
            id: response.id.into(),
            user_id: response.user_id.into(),
            content: response.content.clone(),
            created_at: response.created_at,
            updated_at: response.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDescription {
    pub content: String,
    pub is_visible: bool,
    pub generated_at: DateTime<Utc>,
}

impl From<&Summary> for SummaryDescription {
    fn from(summary: &Summary) -> Self {
        Self {
            content: summary.content.clone(),
            is_visible: summary.is_visible,
            generated_at: summary.generated_at,
        }
    }
}

/// A full survey, redacted for whoever is asking.
///
/// The creator sees every response; anyone else sees only their own, while
/// `response_count` always reports the true total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyDescription {
    pub id: ApiId,
    pub title: String,
    pub area: String,
    pub description: String,
    pub creator_id: ApiId,
    pub guidelines: GuidelinesSpec,
    pub expiry_date: DateTime<Utc>,
    pub is_active: bool,
    pub is_expired: bool,
    pub accepting_responses: bool,
    pub max_responses: u32,
    pub response_count: usize,
    pub responses: Vec<ResponseDescription>,
    #[serde(default)]
    pub summary: Option<SummaryDescription>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SurveyDescription {
    pub fn for_actor(survey: &Survey, actor: Id, now: DateTime<Utc>) -> Self {
        let summary = survey
            .summary
            .as_ref()
            .filter(|_| access::can_view_summary(survey, actor))
            .map(SummaryDescription::from);
        Self {
            id: survey.id.into(),
            title: survey.title.clone(),
            area: survey.area.clone(),
            description: survey.description.clone(),
            creator_id: survey.creator_id.into(),
            guidelines: survey.guidelines.clone().into(),
            expiry_date: survey.expiry_date,
            is_active: survey.is_active,
            is_expired: survey.is_expired_at(now),
            accepting_responses: survey.can_accept_responses_at(now),
            max_responses: survey.max_responses,
            response_count: survey.response_count(),
            responses: access::visible_responses(survey, actor)
                .into_iter()
                .map(ResponseDescription::from)
                .collect(),
            summary,
            created_at: survey.created_at,
            updated_at: survey.updated_at,
        }
    }
}

/// A survey in a listing: no responses, just how many there are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyListing {
    pub id: ApiId,
    pub title: String,
    pub area: String,
    pub description: String,
    pub creator_id: ApiId,
    pub expiry_date: DateTime<Utc>,
    pub is_active: bool,
    pub is_expired: bool,
    pub accepting_responses: bool,
    pub max_responses: u32,
    pub response_count: usize,
    pub created_at: DateTime<Utc>,
}

impl SurveyListing {
    pub fn new(survey: &Survey, now: DateTime<Utc>) -> Self {
        Self {
            id: survey.id.into(),
            title: survey.title.clone(),
            area: survey.area.clone(),
            description: survey.description.clone(),
            creator_id: survey.creator_id.into(),
            expiry_date: survey.expiry_date,
            is_active: survey.is_active,
            is_expired: survey.is_expired_at(now),
            accepting_responses: survey.can_accept_responses_at(now),
            max_responses: survey.max_responses,
            response_count: survey.response_count(),
            created_at: survey.created_at,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};

    use crate::model::db::survey::ResponseContent;

    #[test]
    fn spec_defaults() {
        let creator = Id::new();
        let survey = SurveySpec::example().into_survey(creator, Utc::now()).unwrap();
        assert_eq!(survey.creator_id, creator);
        assert_eq!(survey.max_responses, DEFAULT_MAX_RESPONSES);
        assert!(survey.is_active);
        assert!(survey.responses.is_empty());
        assert!(survey.summary.is_none());
    }

    #[test]
    fn spec_validation() {
        let now = Utc::now();
        let creator = Id::new();

        let mut spec = SurveySpec::example();
        spec.title = "  ".to_string();
        assert!(matches!(
            spec.into_survey(creator, now),
            Err(Error::Validation { field: "title", .. })
        ));

        let mut spec = SurveySpec::example();
        spec.expiry_date = Some(now);
        assert!(matches!(
            spec.into_survey(creator, now),
            Err(Error::Validation {
                field: "expiryDate",
                ..
            })
        ));

        let mut spec = SurveySpec::example();
        spec.expiry_date = None;
        assert!(matches!(
            spec.into_survey(creator, now),
            Err(Error::Validation {
                field: "expiryDate",
                ..
            })
        ));

        let spec = SurveySpec::with_capacity(0);
        assert!(matches!(
            spec.into_survey(creator, now),
            Err(Error::Validation {
                field: "maxResponses",
                ..
            })
        ));
    }

    #[test]
    fn expiry_within_the_current_millisecond_is_rejected() {
        let creator = Id::new();
        let now = Utc.timestamp_opt(1_700_000_000, 466_700_000).unwrap();

        // Just before now, inside the same millisecond.
        let mut spec = SurveySpec::example();
        spec.expiry_date = Some(Utc.timestamp_opt(1_700_000_000, 466_200_000).unwrap());
        assert!(matches!(
            spec.into_survey(creator, now),
            Err(Error::Validation {
                field: "expiryDate",
                ..
            })
        ));

        // Just after now, but stored as the same millisecond.
        let mut spec = SurveySpec::example();
        spec.expiry_date = Some(Utc.timestamp_opt(1_700_000_000, 466_900_000).unwrap());
        assert!(matches!(
            spec.into_survey(creator, now),
            Err(Error::Validation {
                field: "expiryDate",
                ..
            })
        ));

        // The next millisecond is far enough.
        let mut spec = SurveySpec::example();
        let expiry = Utc.timestamp_opt(1_700_000_000, 467_000_000).unwrap();
        spec.expiry_date = Some(expiry);
        let survey = spec.into_survey(creator, now).unwrap();
        assert_eq!(survey.expiry_date, expiry);
        assert!(!survey.is_expired_at(now));
    }

    #[test]
    fn domain_rules() {
        let mut spec = GuidelinesSpec::example();
        spec.permitted_domains = vec![];
        assert!(Guidelines::try_from(spec).is_err());

        let mut spec = GuidelinesSpec::example();
        spec.permitted_domains = vec!["x".repeat(MAX_DOMAIN_LENGTH + 1)];
        assert!(Guidelines::try_from(spec).is_err());

        let mut spec = GuidelinesSpec::example();
        spec.permitted_domains = (0..=MAX_PERMITTED_DOMAINS).map(|i| format!("d{i}")).collect();
        assert!(Guidelines::try_from(spec).is_err());

        // Duplicates collapse, since domains are a set.
        let mut spec = GuidelinesSpec::example();
        spec.permitted_domains = vec!["health".into(), " health ".into(), "food".into()];
        let guidelines = Guidelines::try_from(spec).unwrap();
        assert_eq!(guidelines.permitted_domains.len(), 2);
    }

    #[test]
    fn patch_applies_valid_fields() {
        let mut survey = SurveyCore::example(Id::new());
        let now = Utc::now();
        let patch = SurveyPatch {
            title: Some("Library hours, revisited".to_string()),
            max_responses: Some(5),
            ..Default::default()
        };
        patch.apply(&mut survey, now).unwrap();
        assert_eq!(survey.title, "Library hours, revisited");
        assert_eq!(survey.max_responses, 5);
        assert_eq!(survey.area, "Campus life");
    }

    #[test]
    fn invalid_patch_changes_nothing() {
        let mut survey = SurveyCore::example(Id::new());
        let before = survey.clone();
        let patch = SurveyPatch {
            title: Some("Changed".to_string()),
            expiry_date: Some(Utc::now() - Duration::days(1)),
            ..Default::default()
        };
        assert!(patch.apply(&mut survey, Utc::now()).is_err());
        assert_eq!(survey, before);
    }

    #[test]
    fn capacity_cannot_drop_below_response_count() {
        let mut survey = SurveyCore::example(Id::new());
        let now = Utc::now();
        for _ in 0..3 {
            survey
                .add_response(Id::new(), ResponseContent::parse("ok").unwrap(), now)
                .unwrap();
        }
        let patch = SurveyPatch {
            max_responses: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            patch.apply(&mut survey, now),
            Err(Error::Validation {
                field: "maxResponses",
                ..
            })
        ));
    }

    #[test]
    fn closed_survey_only_accepts_reopening() {
        let mut survey = SurveyCore::example(Id::new());
        survey.close().unwrap();
        let now = Utc::now();

        let rename = SurveyPatch {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            rename.apply(&mut survey, now),
            Err(Error::SurveyClosed)
        ));

        let reopen = SurveyPatch {
            is_active: Some(true),
            ..Default::default()
        };
        reopen.apply(&mut survey, now).unwrap();
        assert!(survey.is_active);
    }

    #[test]
    fn redacted_view_keeps_true_count() {
        let creator = Id::new();
        let me = Id::new();
        let mut survey = Survey::example(creator);
        let now = Utc::now();
        survey
            .add_response(me, ResponseContent::parse("mine").unwrap(), now)
            .unwrap();
        survey
            .add_response(Id::new(), ResponseContent::parse("theirs").unwrap(), now)
            .unwrap();

        let mine = SurveyDescription::for_actor(&survey, me, now);
        assert_eq!(mine.responses.len(), 1);
        assert_eq!(mine.response_count, 2);
        assert_eq!(*mine.responses[0].user_id, me);

        let full = SurveyDescription::for_actor(&survey, creator, now);
        assert_eq!(full.responses.len(), 2);
        assert_eq!(full.response_count, 2);
    }

    #[test]
    fn hidden_summary_is_redacted() {
        let creator = Id::new();
        let mut survey = Survey::example(creator);
        let now = Utc::now();
        survey.summary = Some(Summary::generated("Private notes.".to_string(), now));

        assert!(SurveyDescription::for_actor(&survey, creator, now)
            .summary
            .is_some());
        assert!(SurveyDescription::for_actor(&survey, Id::new(), now)
            .summary
            .is_none());
    }
}

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::{
    doc, ser::Error as BsonError, serde_helpers::chrono_datetime_as_bson_datetime, to_bson,
    DateTime as BsonDateTime, Document,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{lifecycle, timestamp},
    mongodb::Id,
};

/// Capacity used when a survey doesn't specify one.
pub const DEFAULT_MAX_RESPONSES: u32 = 100;
/// Maximum response length, in characters, after trimming.
pub const MAX_CONTENT_LENGTH: usize = 2000;

fn default_max_responses() -> u32 {
    DEFAULT_MAX_RESPONSES
}

/// What a survey asks and what it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guidelines {
    /// The question respondents answer.
    pub question: String,
    /// Topic domains the survey is about.
    pub permitted_domains: BTreeSet<String>,
    /// Free-text rubric describing acceptable responses, used for validation.
    pub permitted_responses: String,
    /// Extra instructions passed along when summarizing.
    #[serde(default)]
    pub summary_instructions: String,
}

/// Validated response text: trimmed, non-empty, and at most
/// [`MAX_CONTENT_LENGTH`] characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseContent(String);

impl ResponseContent {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("content", "must not be empty"));
        }
        let length = trimmed.chars().count();
        if length > MAX_CONTENT_LENGTH {
            return Err(Error::validation(
                "content",
                format!("must be at most {MAX_CONTENT_LENGTH} characters, got {length}"),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for ResponseContent {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// One respondent's answer, embedded in its survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: Id,
    pub user_id: Id,
    pub content: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Response {
    pub fn new(user_id: Id, content: ResponseContent, now: DateTime<Utc>) -> Self {
        let now = timestamp(now);
        Self {
            id: Id::new(),
            user_id,
            content: content.into_inner(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the content, moving `updated_at` strictly forward even if the
    /// clock hasn't advanced since the last write.
    pub fn revise(&mut self, content: ResponseContent, now: DateTime<Utc>) {
        let now = timestamp(now);
        self.content = content.into_inner();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::milliseconds(1)
        };
    }
}

/// A generated summary of a survey's responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub content: String,
    /// Whether non-creators may read it. Every regeneration resets this to false.
    pub is_visible: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub generated_at: DateTime<Utc>,
}

impl Summary {
    /// A freshly generated, private summary.
    pub fn generated(content: String, now: DateTime<Utc>) -> Self {
        Self {
            content,
            is_visible: false,
            generated_at: timestamp(now),
        }
    }
}

/// Core survey data, as stored in the database.
///
/// The survey owns its responses and summary; a single document write
/// persists all of them together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyCore {
    pub title: String,
    pub area: String,
    #[serde(default)]
    pub description: String,
    /// Owner. Never changes after creation.
    pub creator_id: Id,
    pub guidelines: Guidelines,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expiry_date: DateTime<Utc>,
    /// Creator-controlled switch, independent of expiry.
    pub is_active: bool,
    #[serde(default = "default_max_responses")]
    pub max_responses: u32,
    /// In submission order.
    #[serde(default)]
    pub responses: Vec<Response>,
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl SurveyCore {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_date
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_full(&self) -> bool {
        self.responses.len() >= self.max_responses as usize
    }

    pub fn can_accept_responses_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now) && !self.is_full()
    }

    pub fn can_accept_responses(&self) -> bool {
        self.can_accept_responses_at(Utc::now())
    }

    pub fn is_creator(&self, user_id: Id) -> bool {
        self.creator_id == user_id
    }

    pub fn has_user_responded(&self, user_id: Id) -> bool {
        self.responses.iter().any(|r| r.user_id == user_id)
    }

    pub fn user_response(&self, user_id: Id) -> Option<&Response> {
        self.responses.iter().find(|r| r.user_id == user_id)
    }

    pub fn response(&self, response_id: Id) -> Option<&Response> {
        self.responses.iter().find(|r| r.id == response_id)
    }

    pub fn response_count(&self) -> usize {
        self.responses.len()
    }

    /// Append a response from the given user, enforcing the submission rules.
    ///
    /// The response routes apply this and the other response operations to a
    /// fresh snapshot, then persist the outcome with a single conditional write
    /// whose filter repeats the same rules.
    pub fn add_response(
        &mut self,
        user_id: Id,
        content: ResponseContent,
        now: DateTime<Utc>,
    ) -> Result<&Response> {
        lifecycle::check_submission(Some(&*self), user_id, now)?;
        self.responses.push(Response::new(user_id, content, now));
        // Just pushed, so the vector is non-empty.
        self.responses
            .last()
            .ok_or_else(|| Error::Internal("response vanished after push".to_string()))
    }

    /// Replace the given user's response. Returns false if they have none;
    /// a response is never created here.
    pub fn update_user_response(
        &mut self,
        user_id: Id,
        content: ResponseContent,
        now: DateTime<Utc>,
    ) -> bool {
        match self.responses.iter_mut().find(|r| r.user_id == user_id) {
            Some(response) => {
                response.revise(content, now);
                true
            }
            None => false,
        }
    }

    /// Remove the given user's response. Returns false if they have none.
    pub fn remove_user_response(&mut self, user_id: Id) -> bool {
        match self.user_response(user_id) {
            Some(response) => {
                let response_id = response.id;
                self.remove_response(response_id).is_some()
            }
            None => false,
        }
    }

    /// Remove a response by its ID, whoever wrote it.
    pub fn remove_response(&mut self, response_id: Id) -> Option<Response> {
        let index = self.responses.iter().position(|r| r.id == response_id)?;
        Some(self.responses.remove(index))
    }

    /// Stop accepting responses.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_active {
            return Err(Error::AlreadyClosed);
        }
        self.is_active = false;
        Ok(())
    }

    /// Everything a creator can edit, as the body of a `$set`.
    /// Responses and the summary are deliberately absent.
    pub fn metadata_document(&self) -> std::result::Result<Document, BsonError> {
        Ok(doc! {
            "title": &self.title,
            "area": &self.area,
            "description": &self.description,
            "guidelines": to_bson(&self.guidelines)?,
            "expiry_date": BsonDateTime::from_chrono(self.expiry_date),
            "is_active": self.is_active,
            "max_responses": i64::from(self.max_responses),
            "updated_at": BsonDateTime::from_chrono(self.updated_at),
        })
    }
}

/// A survey without an ID.
pub type NewSurvey = SurveyCore;

/// A survey from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub survey: SurveyCore,
}

impl Deref for Survey {
    type Target = SurveyCore;

    fn deref(&self) -> &Self::Target {
        &self.survey
    }
}

impl DerefMut for Survey {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.survey
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Guidelines {
        pub fn example() -> Self {
            Self {
                question: "What should the library stay open late for?".to_string(),
                permitted_domains: BTreeSet::from_iter(vec![
                    "education".to_string(),
                    "campus".to_string(),
                ]),
                permitted_responses: "Concrete suggestions about library opening hours."
                    .to_string(),
                summary_instructions: "Group suggestions by theme.".to_string(),
            }
        }
    }

    impl SurveyCore {
        pub fn example(creator_id: Id) -> Self {
            let now = timestamp(Utc::now());
            Self {
                title: "Library hours".to_string(),
                area: "Campus life".to_string(),
                description: "Help us decide late opening hours.".to_string(),
                creator_id,
                guidelines: Guidelines::example(),
                expiry_date: now + Duration::days(7),
                is_active: true,
                max_responses: DEFAULT_MAX_RESPONSES,
                responses: Vec::new(),
                summary: None,
                created_at: now,
                updated_at: now,
            }
        }
    }

    impl Survey {
        pub fn example(creator_id: Id) -> Self {
            Self {
                id: Id::new(),
                survey: SurveyCore::example(creator_id),
            }
        }
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use mongodb::bson::{doc, to_bson};

use super::{Analyzer, SurveyDigest, Verdict};
use crate::error::{Error, Result};
use crate::model::{
    common::access,
    db::survey::{Response, Summary, Survey},
    mongodb::{Coll, Id},
};

/// A survey matched by a search, with the analyzer's reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit<'s> {
    pub survey: &'s Survey,
    pub reason: String,
}

/// A response the analyzer rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedResponse<'s> {
    pub response: &'s Response,
    pub reason: String,
}

/// Sequences calls to the text analysis collaborator and decides what each
/// caller is allowed to ask of it.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    analyzer: Arc<dyn Analyzer>,
}

impl AnalysisOrchestrator {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self { analyzer }
    }

    /// Rank `surveys` against `query`.
    ///
    /// An empty corpus or a query with no words yields no hits without calling
    /// the analyzer. Matches naming unknown surveys are dropped, as are repeats.
    pub async fn search<'s>(
        &self,
        query: &str,
        surveys: &'s [Survey],
    ) -> Result<Vec<SearchHit<'s>>> {
        let query = query.trim();
        if surveys.is_empty() || query.split_whitespace().next().is_none() {
            return Ok(Vec::new());
        }

        let corpus: Vec<SurveyDigest> = surveys.iter().map(SurveyDigest::from).collect();
        let matches = self.analyzer.search(query, &corpus).await?;

        let mut seen = HashSet::new();
        let hits = matches
            .into_iter()
            .filter_map(|m| {
                let Some(survey) = surveys.iter().find(|s| s.id == *m.id) else {
                    warn!("Analyzer matched unknown survey {}", m.id);
                    return None;
                };
                seen.insert(survey.id).then(|| SearchHit {
                    survey,
                    reason: m.reason,
                })
            })
            .collect::<Vec<_>>();
        debug!("Search for {query:?} matched {} of {} surveys", hits.len(), surveys.len());
        Ok(hits)
    }

    /// Judge one response against the survey's rubric. Creator only.
    pub async fn validate_one(
        &self,
        survey: &Survey,
        actor: Id,
        response_id: Id,
    ) -> Result<Verdict> {
        access::require_creator(survey, actor)?;
        let response = survey
            .response(response_id)
            .ok_or(Error::ResponseNotFound)?;
        let verdict = self
            .analyzer
            .validate(&survey.guidelines.permitted_responses, &response.content)
            .await?;
        Ok(verdict)
    }

    /// Judge every response, returning only those found invalid, in
    /// submission order. Creator only.
    ///
    /// A single failed call fails the whole batch.
    pub async fn validate_all<'s>(
        &self,
        survey: &'s Survey,
        actor: Id,
    ) -> Result<Vec<FlaggedResponse<'s>>> {
        access::require_creator(survey, actor)?;
        let rubric = &survey.guidelines.permitted_responses;
        let mut flagged = Vec::new();
        for response in &survey.responses {
            let verdict = self.analyzer.validate(rubric, &response.content).await?;
            if !verdict.is_valid {
                flagged.push(FlaggedResponse {
                    response,
                    reason: verdict.feedback,
                });
            }
        }
        debug!(
            "Validated {} responses on survey {}, {} flagged",
            survey.response_count(),
            survey.id,
            flagged.len()
        );
        Ok(flagged)
    }

    /// Generate a fresh, private summary of the survey's responses without
    /// storing it. Creator only.
    pub async fn generate_summary(
        &self,
        survey: &Survey,
        actor: Id,
        now: DateTime<Utc>,
    ) -> Result<Summary> {
        access::require_creator(survey, actor)?;
        if survey.responses.is_empty() {
            return Err(Error::NoResponses);
        }
        let texts: Vec<String> = survey.responses.iter().map(|r| r.content.clone()).collect();
        let content = self
            .analyzer
            .summarize(&texts, &survey.guidelines.summary_instructions)
            .await?;
        Ok(Summary::generated(content, now))
    }

    /// Generate a summary and store it on the survey, replacing any earlier one.
    /// Creator only.
    pub async fn summarize(
        &self,
        surveys: &Coll<Survey>,
        survey: &Survey,
        actor: Id,
        now: DateTime<Utc>,
    ) -> Result<Summary> {
        let summary = self.generate_summary(survey, actor, now).await?;
        let result = surveys
            .update_one(
                survey.id.as_doc(),
                doc! {
                    "$set": {
                        "summary": to_bson(&summary)?,
                    }
                },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(Error::SurveyNotFound);
        }
        info!("Stored new summary for survey {}", survey.id);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::analysis::{DisabledAnalyzer, ScriptedAnalyzer};
    use crate::model::db::survey::ResponseContent;

    fn orchestrator(analyzer: &ScriptedAnalyzer) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(Arc::new(analyzer.clone()))
    }

    fn with_responses(creator: Id, texts: &[&str]) -> Survey {
        let mut survey = Survey::example(creator);
        let now = Utc::now();
        for text in texts {
            survey
                .add_response(Id::new(), ResponseContent::parse(text).unwrap(), now)
                .unwrap();
        }
        survey
    }

    #[rocket::async_test]
    async fn search_short_circuits() {
        let analyzer = ScriptedAnalyzer::default();
        let orchestrator = orchestrator(&analyzer);
        let surveys = vec![Survey::example(Id::new())];

        assert!(orchestrator.search("   ", &surveys).await.unwrap().is_empty());
        assert!(orchestrator.search("library", &[]).await.unwrap().is_empty());
        assert_eq!(analyzer.calls(), 0);
    }

    #[rocket::async_test]
    async fn search_ranks_matches() {
        let analyzer = ScriptedAnalyzer::default();
        let orchestrator = orchestrator(&analyzer);
        let mut food = Survey::example(Id::new());
        food.title = "Canteen menu".to_string();
        food.area = "Food".to_string();
        food.description = "Which dishes should stay on the menu?".to_string();
        let library = Survey::example(Id::new());
        let surveys = vec![food, library];

        let hits = orchestrator
            .search("library hours for late study", &surveys)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].survey.id, surveys[1].id);
        assert!(hits[0].reason.contains("library"));
    }

    #[rocket::async_test]
    async fn search_failure_is_typed() {
        let orchestrator = AnalysisOrchestrator::new(Arc::new(DisabledAnalyzer));
        let surveys = vec![Survey::example(Id::new())];
        assert!(matches!(
            orchestrator.search("library", &surveys).await,
            Err(Error::AnalysisUnavailable(_))
        ));
    }

    #[rocket::async_test]
    async fn bulk_validation_only_returns_invalid() {
        let analyzer = ScriptedAnalyzer::default();
        let orchestrator = orchestrator(&analyzer);
        let creator = Id::new();
        let survey = with_responses(
            creator,
            &["Open until midnight", "Something off-topic", "Weekends too"],
        );

        let flagged = orchestrator.validate_all(&survey, creator).await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].response.content, "Something off-topic");
        assert!(!flagged[0].reason.is_empty());
        assert_eq!(analyzer.calls(), 3);
    }

    #[rocket::async_test]
    async fn validation_is_creator_only() {
        let analyzer = ScriptedAnalyzer::default();
        let orchestrator = orchestrator(&analyzer);
        let creator = Id::new();
        let survey = with_responses(creator, &["Open until midnight"]);
        let response_id = survey.responses[0].id;

        assert!(matches!(
            orchestrator.validate_all(&survey, Id::new()).await,
            Err(Error::NotCreator)
        ));
        assert!(matches!(
            orchestrator.validate_one(&survey, Id::new(), response_id).await,
            Err(Error::NotCreator)
        ));
        assert!(matches!(
            orchestrator.validate_one(&survey, creator, Id::new()).await,
            Err(Error::ResponseNotFound)
        ));
        assert_eq!(analyzer.calls(), 0);

        let verdict = orchestrator
            .validate_one(&survey, creator, response_id)
            .await
            .unwrap();
        assert!(verdict.is_valid);
    }

    #[rocket::async_test]
    async fn bulk_validation_fails_as_a_whole() {
        let analyzer = ScriptedAnalyzer::default();
        analyzer.set_failing(true);
        let orchestrator = orchestrator(&analyzer);
        let creator = Id::new();
        let survey = with_responses(creator, &["one", "two"]);
        assert!(matches!(
            orchestrator.validate_all(&survey, creator).await,
            Err(Error::AnalysisUnavailable(_))
        ));
    }

    #[rocket::async_test]
    async fn summary_needs_responses() {
        let analyzer = ScriptedAnalyzer::default();
        let orchestrator = orchestrator(&analyzer);
        let creator = Id::new();
        let survey = Survey::example(creator);
        assert!(matches!(
            orchestrator.generate_summary(&survey, creator, Utc::now()).await,
            Err(Error::NoResponses)
        ));
        assert_eq!(analyzer.calls(), 0);
    }

    #[rocket::async_test]
    async fn new_summaries_are_private() {
        let analyzer = ScriptedAnalyzer::default();
        let orchestrator = orchestrator(&analyzer);
        let creator = Id::new();
        let survey = with_responses(creator, &["one", "two"]);

        let summary = orchestrator
            .generate_summary(&survey, creator, Utc::now())
            .await
            .unwrap();
        assert!(!summary.is_visible);
        assert!(summary.content.starts_with("2 responses"));

        assert!(matches!(
            orchestrator
                .generate_summary(&survey, Id::new(), Utc::now())
                .await,
            Err(Error::NotCreator)
        ));
    }
}

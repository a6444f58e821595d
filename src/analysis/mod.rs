//! Text analysis: the external collaborator that searches, validates and
//! summarizes, and the orchestration that feeds it survey data.
//!
//! The collaborator is only ever reached through the [`Analyzer`] trait.
//! Which implementation is used is decided once, at ignition.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;
use crate::model::{db::survey::Survey, mongodb::ApiId};

mod disabled;
mod orchestrator;
mod remote;
#[cfg(test)]
mod scripted;

pub use disabled::DisabledAnalyzer;
pub use orchestrator::{AnalysisOrchestrator, FlaggedResponse, SearchHit};
pub use remote::RemoteAnalyzer;
#[cfg(test)]
pub use scripted::ScriptedAnalyzer;

/// The searchable projection of a survey. Responses never leave the server
/// through search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyDigest {
    pub id: ApiId,
    pub title: String,
    pub area: String,
    pub description: String,
}

impl From<&Survey> for SurveyDigest {
    fn from(survey: &Survey) -> Self {
        Self {
            id: survey.id.into(),
            title: survey.title.clone(),
            area: survey.area.clone(),
            description: survey.description.clone(),
        }
    }
}

/// One search result, best matches first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub id: ApiId,
    pub reason: String,
}

/// The collaborator's judgement of one response against a rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_valid: bool,
    pub feedback: String,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Text analysis is not configured")]
    Disabled,
    #[error("Request to text analysis service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Text analysis service returned an unusable result: {0}")]
    Malformed(String),
}

impl From<AnalysisError> for Error {
    fn from(err: AnalysisError) -> Self {
        Self::AnalysisUnavailable(err.to_string())
    }
}

/// The text analysis capability. Calls are never retried.
#[rocket::async_trait]
pub trait Analyzer: Send + Sync {
    /// Rank `corpus` against a free-text `query`.
    async fn search(
        &self,
        query: &str,
        corpus: &[SurveyDigest],
    ) -> Result<Vec<RankedMatch>, AnalysisError>;

    /// Judge `text` against a free-text `rubric`.
    async fn validate(&self, rubric: &str, text: &str) -> Result<Verdict, AnalysisError>;

    /// Summarize `responses`, following `instructions`.
    async fn summarize(
        &self,
        responses: &[String],
        instructions: &str,
    ) -> Result<String, AnalysisError>;
}

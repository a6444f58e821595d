use serde::{Deserialize, Serialize};

use crate::analysis::{FlaggedResponse, Verdict};
use crate::error::{Error, Result};
use crate::model::{api::survey::SurveyListing, mongodb::ApiId};

/// A free-text survey search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
}

impl SearchRequest {
    /// The trimmed query, which must contain at least one word.
    pub fn query(&self) -> Result<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or(Error::MissingQuery)
    }
}

/// One search hit: the survey (never its responses) and why it matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub survey: SurveyListing,
    pub reason: String,
}

/// The verdict on a single response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub response_id: ApiId,
    pub is_valid: bool,
    pub feedback: String,
}

impl ValidationResult {
    pub fn new(response_id: ApiId, verdict: Verdict) -> Self {
        Self {
            response_id,
            is_valid: verdict.is_valid,
            feedback: verdict.feedback,
        }
    }
}

/// A response flagged by bulk validation. The content is not included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidResponse {
    pub response_id: ApiId,
    pub user_id: ApiId,
    pub reason: String,
}

impl From<FlaggedResponse<'_>> for InvalidResponse {
    fn from(flagged: FlaggedResponse<'_>) -> Self {
        Self {
            response_id: flagged.response.id.into(),
            user_id: flagged.response.user_id.into(),
            reason: flagged.reason,
        }
    }
}

/// Make a summary public or private.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRequest {
    pub is_visible: bool,
}

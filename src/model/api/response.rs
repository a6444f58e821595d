use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::db::survey::ResponseContent;

/// A response body, as submitted or revised by its author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSpec {
    pub content: String,
}

impl ResponseSpec {
    /// Trim and bound-check the content.
    pub fn content(&self) -> Result<ResponseContent> {
        ResponseContent::parse(&self.content)
    }
}

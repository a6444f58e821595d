//! Who may see and manage what.
//!
//! Roles are never stored: they follow from the survey's creator and its
//! responses each time they are asked for.

use crate::error::{Error, Result};
use crate::model::{
    db::survey::{Response, SurveyCore},
    mongodb::Id,
};

/// An actor's relationship to one survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Authored the survey.
    Creator,
    /// Has a response on the survey.
    Respondent,
    /// Neither.
    Other,
}

impl Role {
    pub fn of(survey: &SurveyCore, actor: Id) -> Self {
        if survey.is_creator(actor) {
            Self::Creator
        } else if survey.has_user_responded(actor) {
            Self::Respondent
        } else {
            Self::Other
        }
    }
}

/// Management actions (edit, delete, close, summarize, validate) are for the creator alone.
pub fn require_creator(survey: &SurveyCore, actor: Id) -> Result<()> {
    if survey.is_creator(actor) {
        Ok(())
    } else {
        Err(Error::NotCreator)
    }
}

/// A single response is visible to its author and to the survey's creator.
pub fn can_view_response(survey: &SurveyCore, response: &Response, actor: Id) -> bool {
    response.user_id == actor || survey.is_creator(actor)
}

/// The creator can always read the summary; everyone else only once it is made visible.
pub fn can_view_summary(survey: &SurveyCore, actor: Id) -> bool {
    match survey.summary {
        Some(ref summary) => summary.is_visible || survey.is_creator(actor),
        None => false,
    }
}

/// The responses `actor` may see: all of them for the creator, otherwise
/// only their own.
pub fn visible_responses(survey: &SurveyCore, actor: Id) -> Vec<&Response> {
    match Role::of(survey, actor) {
        Role::Creator => survey.responses.iter().collect(),
        Role::Respondent => survey.user_response(actor).into_iter().collect(),
        Role::Other => Vec::new(),
    }
}

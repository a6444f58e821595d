//! Whether a response may be submitted, updated or deleted right now.
//!
//! Each check is a pure function of the survey snapshot, the actor and the
//! current time. The order of the checks is part of the contract: when
//! several conditions fail at once, callers see the first one listed.
//!
//! Submission: exists, active, capacity, expiry, duplicate.
//! Update: exists, active, expiry, response exists, actor is the author.
//! Deletion: exists, expiry, response exists, actor is the author or creator.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{
    db::survey::{Response, SurveyCore},
    mongodb::Id,
};

/// Check that `user_id` may submit a new response to `survey`.
pub fn check_submission(
    survey: Option<&SurveyCore>,
    user_id: Id,
    now: DateTime<Utc>,
) -> Result<&SurveyCore> {
    let survey = survey.ok_or(Error::SurveyNotFound)?;
    if !survey.is_active {
        return Err(Error::SurveyInactive);
    }
    // Capacity deliberately takes priority over expiry.
    if survey.is_full() {
        return Err(Error::CapacityExceeded);
    }
    if survey.is_expired_at(now) {
        return Err(Error::SurveyExpired);
    }
    if survey.has_user_responded(user_id) {
        return Err(Error::DuplicateResponse);
    }
    Ok(survey)
}

/// Check that `actor` may replace the content of the given response.
pub fn check_update(
    survey: Option<&SurveyCore>,
    actor: Id,
    response_id: Id,
    now: DateTime<Utc>,
) -> Result<&Response> {
    let survey = survey.ok_or(Error::SurveyNotFound)?;
    if !survey.is_active {
        return Err(Error::SurveyInactive);
    }
    if survey.is_expired_at(now) {
        return Err(Error::SurveyExpired);
    }
    let response = survey
        .response(response_id)
        .ok_or(Error::ResponseNotFound)?;
    if response.user_id != actor {
        return Err(Error::Unauthorized);
    }
    Ok(response)
}

/// Check that `actor` may delete the given response.
/// Closed surveys still allow deletion; expired ones don't.
pub fn check_deletion(
    survey: Option<&SurveyCore>,
    actor: Id,
    response_id: Id,
    now: DateTime<Utc>,
) -> Result<&Response> {
    let survey = survey.ok_or(Error::SurveyNotFound)?;
    if survey.is_expired_at(now) {
        return Err(Error::SurveyExpired);
    }
    let response = survey
        .response(response_id)
        .ok_or(Error::ResponseNotFound)?;
    if response.user_id != actor && !survey.is_creator(actor) {
        return Err(Error::Unauthorized);
    }
    Ok(response)
}

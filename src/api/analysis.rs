use chrono::Utc;
use log::info;
use mongodb::bson::doc;
use rocket::{serde::json::Json, Route, State};

use super::surveys::{find_surveys, load_survey};
use crate::{
    analysis::AnalysisOrchestrator,
    error::{Error, Result},
    model::{
        api::{
            analysis::{
                InvalidResponse, SearchMatch, SearchRequest, ValidationResult, VisibilityRequest,
            },
            auth::AuthToken,
            survey::{SummaryDescription, SurveyListing},
        },
        common::access,
        db::survey::Survey,
        mongodb::{Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        search_surveys,
        validate_response,
        validate_responses,
        generate_summary,
        get_summary,
        set_summary_visibility,
    ]
}

#[post("/surveys/search", data = "<request>", format = "json")]
async fn search_surveys(
    _token: AuthToken,
    request: Json<SearchRequest>,
    surveys: Coll<Survey>,
    analysis: &State<AnalysisOrchestrator>,
) -> Result<Json<Vec<SearchMatch>>> {
    let query = request.query()?;
    let corpus = find_surveys(&surveys, None).await?;
    let hits = analysis.search(query, &corpus).await?;

    let now = Utc::now();
    let matches = hits
        .into_iter()
        .map(|hit| SearchMatch {
            survey: SurveyListing::new(hit.survey, now),
            reason: hit.reason,
        })
        .collect();
    Ok(Json(matches))
}

#[get("/surveys/<id>/responses/<response_id>/validate")]
async fn validate_response(
    token: AuthToken,
    id: Id,
    response_id: Id,
    surveys: Coll<Survey>,
    analysis: &State<AnalysisOrchestrator>,
) -> Result<Json<ValidationResult>> {
    let survey = load_survey(&surveys, id).await?;
    let verdict = analysis
        .validate_one(&survey, token.id, response_id)
        .await?;
    Ok(Json(ValidationResult::new(response_id.into(), verdict)))
}

/// Only the responses judged invalid are returned.
#[get("/surveys/<id>/responses/validate", rank = 1)]
async fn validate_responses(
    token: AuthToken,
    id: Id,
    surveys: Coll<Survey>,
    analysis: &State<AnalysisOrchestrator>,
) -> Result<Json<Vec<InvalidResponse>>> {
    let survey = load_survey(&surveys, id).await?;
    let flagged = analysis.validate_all(&survey, token.id).await?;
    Ok(Json(flagged.into_iter().map(InvalidResponse::from).collect()))
}

/// Generate (or regenerate) the summary. It always starts out private.
#[post("/surveys/<id>/summary")]
async fn generate_summary(
    token: AuthToken,
    id: Id,
    surveys: Coll<Survey>,
    analysis: &State<AnalysisOrchestrator>,
) -> Result<Json<SummaryDescription>> {
    let survey = load_survey(&surveys, id).await?;
    let summary = analysis
        .summarize(&surveys, &survey, token.id, Utc::now())
        .await?;
    Ok(Json((&summary).into()))
}

#[get("/surveys/<id>/summary")]
async fn get_summary(
    token: AuthToken,
    id: Id,
    surveys: Coll<Survey>,
) -> Result<Json<SummaryDescription>> {
    let survey = load_survey(&surveys, id).await?;
    if !access::can_view_summary(&survey, token.id) {
        return Err(Error::NoSummary);
    }
    let summary = survey.summary.as_ref().ok_or(Error::NoSummary)?;
    Ok(Json(summary.into()))
}

/// Toggling visibility never touches the summary's content.
#[patch("/surveys/<id>/summary/visibility", data = "<request>", format = "json")]
async fn set_summary_visibility(
    token: AuthToken,
    id: Id,
    request: Json<VisibilityRequest>,
    surveys: Coll<Survey>,
) -> Result<Json<SummaryDescription>> {
    let survey = load_survey(&surveys, id).await?;
    access::require_creator(&survey, token.id)?;
    if survey.summary.is_none() {
        return Err(Error::NoSummary);
    }

    let has_summary = doc! {
        "_id": id,
        "summary": {"$ne": null},
    };
    let update = doc! {
        "$set": {
            "summary.is_visible": request.is_visible,
        }
    };
    let result = surveys.update_one(has_summary, update, None).await?;
    if result.matched_count == 0 {
        return Err(Error::SurveyNotFound);
    }
    info!(
        "User {} made the summary of survey {id} {}",
        token.id,
        if request.is_visible { "visible" } else { "private" }
    );

    let survey = load_survey(&surveys, id).await?;
    let summary = survey.summary.as_ref().ok_or(Error::NoSummary)?;
    Ok(Json(summary.into()))
}

use chrono::Utc;
use log::{debug, info};
use mongodb::bson::{doc, to_bson, DateTime as BsonDateTime};
use rocket::{http::Status, serde::json::Json, Route};

use super::surveys::{load_survey, MAX_WRITE_ATTEMPTS};
use crate::{
    error::{Error, Result},
    model::{
        api::{auth::AuthToken, response::ResponseSpec, survey::ResponseDescription},
        common::{access, lifecycle},
        db::survey::Survey,
        mongodb::{Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        submit_response,
        get_response,
        update_response,
        delete_response,
    ]
}

/// Submit the caller's response.
///
/// The lifecycle rules are checked against a snapshot and then enforced again
/// by the write filter itself, so two racing submissions can't both land: the
/// loser's filter no longer matches, and re-checking the fresh snapshot tells
/// it why.
#[post("/surveys/<id>/responses", data = "<spec>", format = "json")]
async fn submit_response(
    token: AuthToken,
    id: Id,
    spec: Json<ResponseSpec>,
    surveys: Coll<Survey>,
) -> Result<(Status, Json<ResponseDescription>)> {
    let content = spec.content()?;

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let Some(mut survey) = surveys.find_one(id.as_doc(), None).await? else {
            return Err(Error::SurveyNotFound);
        };
        let now = Utc::now();
        let response = survey.add_response(token.id, content.clone(), now)?.clone();

        let still_eligible = doc! {
            "_id": id,
            "is_active": true,
            "expiry_date": {"$gte": BsonDateTime::from_chrono(now)},
            "responses.user_id": {"$ne": token.id},
            "$expr": {
                "$lt": [{"$size": "$responses"}, "$max_responses"],
            },
        };
        let push = doc! {
            "$push": {
                "responses": to_bson(&response)?,
            }
        };
        let result = surveys.update_one(still_eligible, push, None).await?;
        if result.matched_count == 1 {
            info!("User {} responded to survey {id}", token.id);
            return Ok((Status::Created, Json((&response).into())));
        }
        debug!("Survey {id} changed during submission (attempt {attempt}), re-checking");
    }
    Err(Error::Internal(format!(
        "survey {id} kept changing during submission"
    )))
}

/// Visible to the response's author and the survey's creator.
#[get("/surveys/<id>/responses/<response_id>", rank = 2)]
async fn get_response(
    token: AuthToken,
    id: Id,
    response_id: Id,
    surveys: Coll<Survey>,
) -> Result<Json<ResponseDescription>> {
    let survey = load_survey(&surveys, id).await?;
    let response = survey
        .response(response_id)
        .ok_or(Error::ResponseNotFound)?;
    if !access::can_view_response(&survey, response, token.id) {
        return Err(Error::Unauthorized);
    }
    Ok(Json(response.into()))
}

/// Replace the content of the caller's own response.
#[patch("/surveys/<id>/responses/<response_id>", data = "<spec>", format = "json")]
async fn update_response(
    token: AuthToken,
    id: Id,
    response_id: Id,
    spec: Json<ResponseSpec>,
    surveys: Coll<Survey>,
) -> Result<Json<ResponseDescription>> {
    let content = spec.content()?;

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut survey = surveys.find_one(id.as_doc(), None).await?;
        let now = Utc::now();
        let previous_update =
            lifecycle::check_update(survey.as_deref(), token.id, response_id, now)?.updated_at;
        let survey = survey.as_mut().ok_or(Error::SurveyNotFound)?;
        if !survey.update_user_response(token.id, content.clone(), now) {
            return Err(Error::ResponseNotFound);
        }
        let response = survey
            .user_response(token.id)
            .ok_or(Error::ResponseNotFound)?
            .clone();
        let previous_update = BsonDateTime::from_chrono(previous_update);

        let unchanged = doc! {
            "_id": id,
            "is_active": true,
            "expiry_date": {"$gte": BsonDateTime::from_chrono(now)},
            "responses": {
                "$elemMatch": {
                    "id": response_id,
                    "user_id": token.id,
                    "updated_at": previous_update,
                }
            },
        };
        let revise = doc! {
            "$set": {
                "responses.$.content": &response.content,
                "responses.$.updated_at": BsonDateTime::from_chrono(response.updated_at),
            }
        };
        let result = surveys.update_one(unchanged, revise, None).await?;
        if result.matched_count == 1 {
            info!("User {} revised response {response_id} on survey {id}", token.id);
            return Ok(Json((&response).into()));
        }
        debug!("Response {response_id} changed during update (attempt {attempt}), re-checking");
    }
    Err(Error::Internal(format!(
        "response {response_id} kept changing during update"
    )))
}

/// Remove a response. Allowed for its author and the survey's creator.
#[delete("/surveys/<id>/responses/<response_id>")]
async fn delete_response(
    token: AuthToken,
    id: Id,
    response_id: Id,
    surveys: Coll<Survey>,
) -> Result<Status> {
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut survey = surveys.find_one(id.as_doc(), None).await?;
        let now = Utc::now();
        lifecycle::check_deletion(survey.as_deref(), token.id, response_id, now)?;
        survey
            .as_mut()
            .and_then(|survey| survey.remove_response(response_id))
            .ok_or(Error::ResponseNotFound)?;

        let unexpired = doc! {
            "_id": id,
            "expiry_date": {"$gte": BsonDateTime::from_chrono(now)},
            "responses.id": response_id,
        };
        let pull = doc! {
            "$pull": {
                "responses": {"id": response_id},
            }
        };
        let result = surveys.update_one(unexpired, pull, None).await?;
        if result.modified_count == 1 {
            info!("User {} deleted response {response_id} on survey {id}", token.id);
            return Ok(Status::Ok);
        }
        debug!("Response {response_id} changed during deletion (attempt {attempt}), re-checking");
    }
    Err(Error::Internal(format!(
        "response {response_id} kept changing during deletion"
    )))
}

use chrono::Utc;
use log::{debug, info};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    options::FindOptions,
};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            survey::{SurveyDescription, SurveyListing, SurveyPatch, SurveySpec},
        },
        common::{access, timestamp},
        db::survey::{NewSurvey, Survey},
        mongodb::{Coll, Id},
    },
};

/// How many times a conditional write is retried against a fresh snapshot
/// before giving up.
pub(crate) const MAX_WRITE_ATTEMPTS: usize = 5;

pub fn routes() -> Vec<Route> {
    routes![
        create_survey,
        list_surveys,
        get_survey,
        update_survey,
        delete_survey,
        close_survey,
    ]
}

/// Fetch a survey by ID.
pub(crate) async fn load_survey(surveys: &Coll<Survey>, id: Id) -> Result<Survey> {
    surveys
        .find_one(id.as_doc(), None)
        .await?
        .ok_or(Error::SurveyNotFound)
}

/// Fetch every survey matching `filter`, newest first.
pub(crate) async fn find_surveys(
    surveys: &Coll<Survey>,
    filter: Option<Document>,
) -> Result<Vec<Survey>> {
    let newest_first = FindOptions::builder()
        .sort(doc! {"created_at": -1, "_id": -1})
        .build();
    let found: Vec<Survey> = surveys
        .find(filter, newest_first)
        .await?
        .try_collect()
        .await?;
    Ok(found)
}

#[post("/surveys", data = "<spec>", format = "json")]
async fn create_survey(
    token: AuthToken,
    spec: Json<SurveySpec>,
    new_surveys: Coll<NewSurvey>,
) -> Result<(Status, Json<SurveyDescription>)> {
    let now = Utc::now();
    let survey = spec.0.into_survey(token.id, now)?;
    let id: Id = new_surveys
        .insert_one(&survey, None)
        .await?
        .inserted_id
        .as_object_id()
        .ok_or_else(|| Error::Internal("inserted survey has no ObjectId".to_string()))?
        .into();
    info!("User {} created survey {id}", token.id);

    let survey = Survey { id, survey };
    let description = SurveyDescription::for_actor(&survey, token.id, now);
    Ok((Status::Created, Json(description)))
}

#[get("/surveys?<mine>&<open>")]
async fn list_surveys(
    token: AuthToken,
    mine: Option<bool>,
    open: Option<bool>,
    surveys: Coll<Survey>,
) -> Result<Json<Vec<SurveyListing>>> {
    let filter = mine
        .unwrap_or(false)
        .then(|| doc! {"creator_id": token.id});
    let now = Utc::now();
    let listings = find_surveys(&surveys, filter)
        .await?
        .iter()
        .filter(|survey| !open.unwrap_or(false) || survey.can_accept_responses_at(now))
        .map(|survey| SurveyListing::new(survey, now))
        .collect();
    Ok(Json(listings))
}

#[get("/surveys/<id>")]
async fn get_survey(
    token: AuthToken,
    id: Id,
    surveys: Coll<Survey>,
) -> Result<Json<SurveyDescription>> {
    let survey = load_survey(&surveys, id).await?;
    Ok(Json(SurveyDescription::for_actor(
        &survey,
        token.id,
        Utc::now(),
    )))
}

#[patch("/surveys/<id>", data = "<patch>", format = "json")]
async fn update_survey(
    token: AuthToken,
    id: Id,
    patch: Json<SurveyPatch>,
    surveys: Coll<Survey>,
) -> Result<Json<SurveyDescription>> {
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut survey = load_survey(&surveys, id).await?;
        access::require_creator(&survey, token.id)?;
        let previous_update = BsonDateTime::from_chrono(survey.updated_at);
        let was_active = survey.is_active;

        let now = Utc::now();
        (*patch).clone().apply(&mut survey, now)?;

        // Only write over the snapshot we validated against, and never lower
        // the capacity below a count that grew in the meantime.
        let unchanged = doc! {
            "_id": id,
            "updated_at": previous_update,
            "is_active": was_active,
            "$expr": {
                "$lte": [{"$size": "$responses"}, i64::from(survey.max_responses)],
            },
        };
        let update = doc! {
            "$set": survey.metadata_document()?,
        };
        let result = surveys.update_one(unchanged, update, None).await?;
        if result.matched_count == 1 {
            info!("User {} updated survey {id}", token.id);
            let survey = load_survey(&surveys, id).await?;
            return Ok(Json(SurveyDescription::for_actor(
                &survey,
                token.id,
                Utc::now(),
            )));
        }
        debug!("Survey {id} changed during update (attempt {attempt}), retrying");
    }
    Err(Error::Internal(format!(
        "survey {id} kept changing during update"
    )))
}

#[delete("/surveys/<id>")]
async fn delete_survey(token: AuthToken, id: Id, surveys: Coll<Survey>) -> Result<Status> {
    let survey = load_survey(&surveys, id).await?;
    access::require_creator(&survey, token.id)?;

    let owned = doc! {
        "_id": id,
        "creator_id": token.id,
    };
    let result = surveys.delete_one(owned, None).await?;
    if result.deleted_count == 0 {
        return Err(Error::SurveyNotFound);
    }
    info!("User {} deleted survey {id}", token.id);
    Ok(Status::Ok)
}

#[post("/surveys/<id>/close")]
async fn close_survey(
    token: AuthToken,
    id: Id,
    surveys: Coll<Survey>,
) -> Result<Json<SurveyDescription>> {
    let mut survey = load_survey(&surveys, id).await?;
    access::require_creator(&survey, token.id)?;
    survey.close()?;

    let now = Utc::now();
    let still_active = doc! {
        "_id": id,
        "is_active": true,
    };
    let update = doc! {
        "$set": {
            "is_active": false,
            "updated_at": BsonDateTime::from_chrono(timestamp(now)),
        }
    };
    let result = surveys.update_one(still_active, update, None).await?;
    if result.matched_count == 0 {
        // Closed (or deleted) by someone else since we looked.
        return Err(load_survey(&surveys, id)
            .await
            .err()
            .unwrap_or(Error::AlreadyClosed));
    }
    info!("User {} closed survey {id}", token.id);

    let survey = load_survey(&surveys, id).await?;
    Ok(Json(SurveyDescription::for_actor(&survey, token.id, now)))
}

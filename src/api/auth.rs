use log::info;
use mongodb::bson::doc;
use rocket::{http::Status, serde::json::Json, Route, State};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::auth::{AuthToken, Credentials, IssuedToken},
        db::user::{NewUser, User},
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![register, login]
}

#[post("/auth/register", data = "<credentials>", format = "json")]
pub async fn register(
    credentials: Json<Credentials>,
    new_users: Coll<NewUser>,
    config: &State<Config>,
) -> Result<(Status, Json<IssuedToken>)> {
    let user: NewUser = credentials.0.try_into()?;

    // The unique index is the arbiter of username collisions.
    let inserted = match new_users.insert_one(&user, None).await {
        Ok(inserted) => inserted,
        Err(e) if is_duplicate_key_error(&e) => {
            return Err(Error::validation("username", "is already taken"));
        }
        Err(e) => return Err(e.into()),
    };
    let id: Id = inserted
        .inserted_id
        .as_object_id()
        .ok_or_else(|| Error::Internal("inserted user has no ObjectId".to_string()))?
        .into();
    info!("Registered user {} ({id})", user.username);

    let token = AuthToken { id }.issue(config)?;
    Ok((Status::Created, Json(token)))
}

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn login(
    credentials: Json<Credentials>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<IssuedToken>> {
    let with_username = doc! {
        "username": credentials.username.trim(),
    };

    let user = users
        .find_one(with_username, None)
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or(Error::Unauthenticated)?;

    let token = AuthToken::new(&user).issue(config)?;
    Ok(Json(token))
}

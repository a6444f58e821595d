use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    db::user::User,
    mongodb::{ApiId, Coll, Id},
};

/// An authenticated actor, proven by a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthToken {
    pub id: Id,
}

/// A freshly issued token, as handed to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// JWT claims: the user ID plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    sub: ApiId,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

impl AuthToken {
    /// Create a new [`AuthToken`] for the given user.
    pub fn new(user: &User) -> Self {
        Self { id: user.id }
    }

    /// Sign this token.
    pub fn issue(self, config: &Config) -> Result<IssuedToken> {
        let claims = Claims {
            sub: self.id.into(),
            expire_at: Utc::now() + config.auth_ttl(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(IssuedToken {
            token,
            expires_at: claims.expire_at,
        })
    }

    /// Verify and decode a signed token.
    pub fn decode(token: &str, config: &Config) -> Result<Self> {
        let claims = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|data: TokenData<Claims>| data.claims)?;
        Ok(Self { id: *claims.sub })
    }

    /// Extract the token from an `Authorization: Bearer <token>` header value.
    fn from_header(value: &str, config: &Config) -> Result<Self> {
        let (scheme, token) = value.trim().split_once(' ').ok_or(Error::Unauthenticated)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(Error::Unauthenticated);
        }
        Self::decode(token.trim(), config).map_err(|_| Error::Unauthenticated)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an [`AuthToken`] from the `Authorization` header and check the user still exists.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Outcome::Success(config) = req.guard::<&State<Config>>().await else {
            let err = Error::Internal("application config is not managed".to_string());
            return Outcome::Failure((Status::InternalServerError, err));
        };

        let token = match req.headers().get_one("Authorization") {
            Some(value) => Self::from_header(value, config),
            None => Err(Error::Unauthenticated),
        };
        let token = match token {
            Ok(token) => token,
            Err(e) => return Outcome::Failure((Status::Unauthorized, e)),
        };

        // Check the user actually exists.
        let Outcome::Success(users) = req.guard::<Coll<User>>().await else {
            let err = Error::Internal("database is not managed".to_string());
            return Outcome::Failure((Status::InternalServerError, err));
        };
        let user = users.find_one(token.id.as_doc(), None).await;
        match user {
            Ok(Some(_)) => Outcome::Success(token),
            Ok(None) => Outcome::Failure((Status::Unauthorized, Error::Unauthenticated)),
            Err(e) => Outcome::Failure((Status::InternalServerError, e.into())),
        }
    }
}

use argon2::Error as Argon2Error;
use jsonwebtoken::errors::Error as JwtError;
use log::{debug, error, warn};
use mongodb::{bson::ser::Error as BsonError, error::Error as DbError};
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a request can end in.
///
/// Business-rule violations are ordinary values returned at the point they
/// are detected; only the transparent variants at the bottom represent
/// unexpected failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid `{field}`: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("Missing or invalid bearer token")]
    Unauthenticated,
    #[error("Only the creator of this survey may do that")]
    NotCreator,
    #[error("You are not allowed to act on this response")]
    Unauthorized,
    #[error("Survey not found")]
    SurveyNotFound,
    #[error("Response not found")]
    ResponseNotFound,
    #[error("Survey is closed")]
    SurveyClosed,
    #[error("Survey is not accepting responses")]
    SurveyInactive,
    #[error("Survey has expired")]
    SurveyExpired,
    #[error("Survey has reached its maximum number of responses")]
    CapacityExceeded,
    #[error("You have already responded to this survey")]
    DuplicateResponse,
    #[error("Survey is already closed")]
    AlreadyClosed,
    #[error("Survey has no responses to summarize")]
    NoResponses,
    #[error("Survey has no summary")]
    NoSummary,
    #[error("A non-empty search query is required")]
    MissingQuery,
    #[error("Text analysis is unavailable: {0}")]
    AnalysisUnavailable(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Bson(#[from] BsonError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Stable, machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::NotCreator => "NOT_CREATOR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::SurveyNotFound => "SURVEY_NOT_FOUND",
            Self::ResponseNotFound => "RESPONSE_NOT_FOUND",
            Self::SurveyClosed => "SURVEY_CLOSED",
            Self::SurveyInactive => "SURVEY_INACTIVE",
            Self::SurveyExpired => "SURVEY_EXPIRED",
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::DuplicateResponse => "DUPLICATE_RESPONSE",
            Self::AlreadyClosed => "ALREADY_CLOSED",
            Self::NoResponses => "NO_RESPONSES",
            Self::NoSummary => "NO_SUMMARY",
            Self::MissingQuery => "MISSING_QUERY",
            Self::AnalysisUnavailable(_) => "ANALYSIS_UNAVAILABLE",
            Self::Db(_) | Self::Bson(_) | Self::Jwt(_) | Self::Argon2(_) | Self::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Validation { .. }
            | Self::SurveyClosed
            | Self::SurveyInactive
            | Self::SurveyExpired
            | Self::NoResponses
            | Self::MissingQuery => Status::BadRequest,
            Self::Unauthenticated => Status::Unauthorized,
            Self::NotCreator | Self::Unauthorized => Status::Forbidden,
            Self::SurveyNotFound | Self::ResponseNotFound | Self::NoSummary => Status::NotFound,
            Self::CapacityExceeded | Self::DuplicateResponse | Self::AlreadyClosed => {
                Status::Conflict
            }
            Self::AnalysisUnavailable(_) => Status::ServiceUnavailable,
            Self::Db(_) | Self::Bson(_) | Self::Jwt(_) | Self::Argon2(_) | Self::Internal(_) => {
                Status::InternalServerError
            }
        }
    }

    /// Is this an unexpected failure rather than a business rule?
    pub fn is_internal(&self) -> bool {
        self.status() == Status::InternalServerError
    }
}

/// The JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
        }
    }
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        if err.is_internal() {
            // Never leak internals to the caller.
            return Self::new(err.code(), "An internal error occurred");
        }
        let field = match err {
            Error::Validation { field, .. } => Some(field.to_string()),
            _ => None,
        };
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            field,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        match self {
            ref e if e.is_internal() => error!("{} {}: {e:?}", req.method(), req.uri()),
            Self::AnalysisUnavailable(ref reason) => warn!("Text analysis failed: {reason}"),
            ref e => debug!("Rejected {} {}: {e}", req.method(), req.uri()),
        }
        (status, Json(ErrorBody::from(&self))).respond_to(req)
    }
}

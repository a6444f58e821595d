use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};

use crate::error::ErrorBody;

mod analysis;
mod auth;
mod responses;
mod surveys;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(surveys::routes());
    routes.extend(responses::routes());
    routes.extend(analysis::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

/// Errors raised before a handler runs (failed guards, unparseable bodies,
/// unknown routes) get the same JSON shape as handler errors.
#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> Json<ErrorBody> {
    let code = match status.code {
        400 | 422 => "VALIDATION_ERROR",
        401 => "UNAUTHENTICATED",
        404 => "NOT_FOUND",
        415 => "UNSUPPORTED_MEDIA_TYPE",
        500..=599 => "INTERNAL_ERROR",
        _ => "HTTP_ERROR",
    };
    let message = status.reason().unwrap_or("Unknown error");
    Json(ErrorBody::new(code, message))
}

/// Helpers shared by the route tests.
#[cfg(test)]
pub(crate) mod test_util {
    use rocket::{
        http::{ContentType, Header, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::serde_json,
    };

    use crate::error::ErrorBody;
    use crate::model::{
        api::{
            auth::{Credentials, IssuedToken},
            response::ResponseSpec,
            survey::{ResponseDescription, SurveyDescription, SurveySpec},
        },
        mongodb::Id,
    };

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {token}"))
    }

    /// Register a user and return their bearer token.
    pub async fn register_user(client: &Client, credentials: &Credentials) -> String {
        let response = client
            .post("/auth/register")
            .header(ContentType::JSON)
            .body(serde_json::to_string(credentials).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        let issued: IssuedToken =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        issued.token
    }

    pub async fn create_survey_as(
        client: &Client,
        token: &str,
        spec: &SurveySpec,
    ) -> SurveyDescription {
        let response = client
            .post("/surveys")
            .header(ContentType::JSON)
            .header(bearer(token))
            .body(serde_json::to_string(spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }

    pub async fn get_survey_as(client: &Client, token: &str, id: Id) -> SurveyDescription {
        let response = client
            .get(format!("/surveys/{id}"))
            .header(bearer(token))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }

    pub async fn post_response<'c>(
        client: &'c Client,
        token: &str,
        survey_id: Id,
        content: &str,
    ) -> LocalResponse<'c> {
        client
            .post(format!("/surveys/{survey_id}/responses"))
            .header(ContentType::JSON)
            .header(bearer(token))
            .body(serde_json::to_string(&ResponseSpec::with_content(content)).unwrap())
            .dispatch()
            .await
    }

    /// Submit a response, expecting success.
    pub async fn submit_response(
        client: &Client,
        token: &str,
        survey_id: Id,
        content: &str,
    ) -> ResponseDescription {
        let response = post_response(client, token, survey_id, content).await;
        assert_eq!(Status::Created, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }

    /// Check an error response's status and code, and return its body.
    pub async fn expect_error(
        response: LocalResponse<'_>,
        status: Status,
        code: &str,
    ) -> ErrorBody {
        assert_eq!(status, response.status());
        let body: ErrorBody =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body.code, code);
        body
    }
}

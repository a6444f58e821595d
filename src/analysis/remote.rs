use std::time::Duration;

use log::debug;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{AnalysisError, Analyzer, RankedMatch, SurveyDigest, Verdict};

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    corpus: &'a [SurveyDigest],
}

#[derive(Deserialize)]
struct SearchResponse {
    matches: Vec<RankedMatch>,
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    rubric: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    responses: &'a [String],
    instructions: &'a str,
}

#[derive(Deserialize)]
struct SummarizeResponse {
    summary: String,
}

/// An HTTP text analysis service speaking JSON.
///
/// Each operation is a `POST` to `{base_url}/search`, `/validate` or
/// `/summarize`, authenticated with an optional bearer key.
pub struct RemoteAnalyzer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteAnalyzer {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
        })
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{operation}", self.base_url)
    }

    async fn call<Req, Res>(&self, operation: &str, body: &Req) -> Result<Res, AnalysisError>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let url = self.endpoint(operation);
        debug!("Calling text analysis service: POST {url}");
        let mut request = self.client.post(url).json(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[rocket::async_trait]
impl Analyzer for RemoteAnalyzer {
    async fn search(
        &self,
        query: &str,
        corpus: &[SurveyDigest],
    ) -> Result<Vec<RankedMatch>, AnalysisError> {
        let response: SearchResponse = self
            .call("search", &SearchRequest { query, corpus })
            .await?;
        Ok(response.matches)
    }

    async fn validate(&self, rubric: &str, text: &str) -> Result<Verdict, AnalysisError> {
        self.call("validate", &ValidateRequest { rubric, text })
            .await
    }

    async fn summarize(
        &self,
        responses: &[String],
        instructions: &str,
    ) -> Result<String, AnalysisError> {
        let response: SummarizeResponse = self
            .call(
                "summarize",
                &SummarizeRequest {
                    responses,
                    instructions,
                },
            )
            .await?;
        if response.summary.trim().is_empty() {
            return Err(AnalysisError::Malformed("empty summary".to_string()));
        }
        Ok(response.summary)
    }
}

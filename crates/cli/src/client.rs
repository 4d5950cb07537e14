//! HTTP client for the standup API, authenticated with the cached session's
//! access token.

use anyhow::{bail, Context};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use standup::validation::ValidationErrors;
use standup::SubmitRequest;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

/// Outcome of posting the draft.
#[derive(Debug)]
pub enum Submitted {
    Created(Value),
    Invalid(ValidationErrors),
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn ensure_success(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body["error"].as_str().unwrap_or("request failed");
    if status == StatusCode::UNAUTHORIZED {
        bail!("{message}; run `standup login`");
    }
    bail!("{status}: {message}")
}

impl ApiClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
        }
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> reqwest::RequestBuilder {
        debug!(path, "GET");
        self.http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .query(query)
    }

    pub async fn get_json(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<Value> {
        let response = self.get(path, query).send().await.context("API unreachable")?;
        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn get_text(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<String> {
        let response = self.get(path, query).send().await.context("API unreachable")?;
        Ok(ensure_success(response).await?.text().await?)
    }

    pub async fn submit(&self, request: &SubmitRequest) -> anyhow::Result<Submitted> {
        let response = self
            .http
            .post(format!("{}/api/updates", self.base_url))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .context("API unreachable")?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body: Value = response.json().await?;
            let fields = serde_json::from_value(body["fields"].clone()).unwrap_or_default();
            return Ok(Submitted::Invalid(fields));
        }
        Ok(Submitted::Created(ensure_success(response).await?.json().await?))
    }
}

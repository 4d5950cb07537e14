//! Client for the hosted auth service's REST endpoints.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::{AuthError, AuthIdentity, AuthSession, TokenVerifier};

#[derive(Clone)]
pub struct HostedAuthClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| Utc::now().timestamp() + secs));
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user_id: self.user.id,
            email: self.user.email.unwrap_or_default(),
        }
    }
}

fn unavailable(err: reqwest::Error) -> AuthError {
    AuthError::Unavailable(err.to_string())
}

/// 400/401/403 mean the provider rejected what we sent; anything else is the
/// provider's problem.
async fn reject(response: reqwest::Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if matches!(status.as_u16(), 400 | 401 | 403) {
        AuthError::InvalidSession(format!("{status}: {body}"))
    } else {
        warn!("auth provider answered {status}");
        AuthError::Unavailable(format!("{status}: {body}"))
    }
}

impl HostedAuthClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url, api_key: api_key.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    pub async fn get_user(&self, access_token: &str) -> Result<AuthIdentity, AuthError> {
        let response = self
            .client
            .get(self.url("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(reject(response).await);
        }

        let user: UserResponse = response.json().await.map_err(unavailable)?;
        let email = user
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AuthError::InvalidSession("account has no email".into()))?;
        Ok(AuthIdentity { user_id: user.id, email })
    }

    async fn token(&self, grant_type: &str, body: serde_json::Value) -> Result<AuthSession, AuthError> {
        let response = self
            .client
            .post(self.url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(reject(response).await);
        }

        let token: TokenResponse = response.json().await.map_err(unavailable)?;
        debug!(grant_type, "auth provider issued session");
        Ok(token.into_session())
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.token("password", json!({ "email": email, "password": password })).await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        self.token("refresh_token", json!({ "refresh_token": refresh_token })).await
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url("logout"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(unavailable)?;

        // An already-expired token is as signed out as it gets.
        if response.status().is_success() || response.status().as_u16() == 401 {
            Ok(())
        } else {
            Err(reject(response).await)
        }
    }
}

#[async_trait]
impl TokenVerifier for HostedAuthClient {
    async fn verify(&self, access_token: &str) -> Result<AuthIdentity, AuthError> {
        self.get_user(access_token).await
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn get_user_sends_api_key_and_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .match_header("apikey", "anon")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "id": "u-1", "email": "asha@example.com" }).to_string())
            .create_async()
            .await;

        let client = HostedAuthClient::new(reqwest::Client::new(), server.url(), "anon");
        let identity = client.get_user("tok").await.expect("valid token");

        assert_eq!(identity.email, "asha@example.com");
        assert_eq!(identity.user_id, "u-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_token_is_an_invalid_session() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/auth/v1/user").with_status(401).create_async().await;

        let client = HostedAuthClient::new(reqwest::Client::new(), server.url(), "anon");
        let err = client.get_user("stale").await.unwrap_err();

        assert!(err.is_invalid_session());
    }

    #[tokio::test]
    async fn provider_outage_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/auth/v1/user").with_status(502).create_async().await;

        let client = HostedAuthClient::new(reqwest::Client::new(), server.url(), "anon");
        let err = client.get_user("tok").await.unwrap_err();

        assert!(matches!(err, AuthError::Unavailable(_)));
    }

    #[tokio::test]
    async fn refresh_uses_refresh_token_grant() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
            .match_body(Matcher::Json(json!({ "refresh_token": "r-1" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "access_token": "a-2",
                    "refresh_token": "r-2",
                    "expires_at": 1_900_000_000i64,
                    "user": { "id": "u-1", "email": "asha@example.com" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = HostedAuthClient::new(reqwest::Client::new(), server.url(), "anon");
        let session = client.refresh_session("r-1").await.expect("refresh");

        assert_eq!(session.access_token, "a-2");
        assert_eq!(session.refresh_token, "r-2");
        assert_eq!(session.expires_at, Some(1_900_000_000));
        mock.assert_async().await;
    }
}

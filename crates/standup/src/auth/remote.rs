//! [`SessionBackend`] used by the terminal client: tokens come from the
//! hosted auth service, the profile comes from the standup API's `/api/me`.

use async_trait::async_trait;

use crate::auth::{AuthError, AuthIdentity, AuthSession, HostedAuthClient, SessionBackend};
use crate::models::CachedUser;

#[derive(Clone)]
pub struct RemoteBackend {
    auth: HostedAuthClient,
    client: reqwest::Client,
    api_url: String,
}

impl RemoteBackend {
    pub fn new(auth: HostedAuthClient, client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_owned();
        Self { auth, client, api_url }
    }
}

#[async_trait]
impl SessionBackend for RemoteBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.auth.sign_in_with_password(email, password).await
    }

    async fn validate(&self, session: &AuthSession) -> Result<AuthIdentity, AuthError> {
        self.auth.get_user(&session.access_token).await
    }

    async fn refresh(&self, session: &AuthSession) -> Result<AuthSession, AuthError> {
        self.auth.refresh_session(&session.refresh_token).await
    }

    async fn load_profile(&self, session: &AuthSession) -> Result<CachedUser, AuthError> {
        let response = self
            .client
            .get(format!("{}/api/me", self.api_url))
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(AuthError::InvalidSession("profile request rejected".into()));
        }
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!("profile request failed: {status}")));
        }

        response
            .json::<CachedUser>()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError> {
        self.auth.sign_out(&session.access_token).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::Role;

    fn session() -> AuthSession {
        AuthSession {
            access_token: "tok".into(),
            refresh_token: "ref".into(),
            expires_at: None,
            user_id: "u-1".into(),
            email: "asha@example.com".into(),
        }
    }

    #[tokio::test]
    async fn profile_comes_from_api_me() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/me")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "u-1",
                    "email": "asha@example.com",
                    "name": "Asha",
                    "role": "manager",
                    "teamName": "Platform"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let auth = HostedAuthClient::new(reqwest::Client::new(), server.url(), "anon");
        let backend = RemoteBackend::new(auth, reqwest::Client::new(), server.url());
        let profile = backend.load_profile(&session()).await.expect("profile");

        assert_eq!(profile.role, Role::Manager);
        assert_eq!(profile.team_name.as_deref(), Some("Platform"));
        assert_eq!(profile.last_checked, None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_profile_request_invalidates_session() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/api/me").with_status(401).create_async().await;

        let auth = HostedAuthClient::new(reqwest::Client::new(), server.url(), "anon");
        let backend = RemoteBackend::new(auth, reqwest::Client::new(), server.url());
        let err = backend.load_profile(&session()).await.unwrap_err();

        assert!(err.is_invalid_session());
    }
}

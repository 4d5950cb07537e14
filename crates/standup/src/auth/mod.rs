//! Authentication seams.
//!
//! - [`TokenVerifier`] is what the HTTP server needs: turn a bearer token
//!   into an identity.
//! - [`SessionBackend`] is what a client's session cache needs: sign in,
//!   validate, refresh, sign out, and load the derived profile.
//!
//! [`HostedAuthClient`] talks to the hosted auth service; [`RemoteBackend`]
//! combines it with the standup API to serve clients.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::CachedUser;

pub mod hosted;
pub mod remote;

pub use hosted::HostedAuthClient;
pub use remote::RemoteBackend;

/// Errors from the auth provider.
///
/// `Clone` because one revalidation result is shared by every caller waiting
/// on the same in-flight check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The token or credentials were rejected; the session must be dropped.
    #[error("session invalid: {0}")]
    InvalidSession(String),

    /// The provider could not be reached or answered unexpectedly.
    #[error("auth backend unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    pub fn is_invalid_session(&self) -> bool {
        matches!(self, Self::InvalidSession(_))
    }
}

/// Who a valid access token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
    pub user_id: String,
    pub email: String,
}

/// Tokens issued by the auth provider, persisted by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds; `None` when the provider did not say.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user_id: String,
    pub email: String,
}

impl AuthSession {
    /// True when the access token is expired at `now` (Unix seconds), or
    /// will be within `margin_secs`. Unknown expiry counts as valid.
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at.map_or(false, |at| at - margin_secs <= now)
    }
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, access_token: &str) -> Result<AuthIdentity, AuthError>;
}

#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Confirm the session is still accepted by the provider.
    async fn validate(&self, session: &AuthSession) -> Result<AuthIdentity, AuthError>;

    /// Exchange the refresh token for a fresh session.
    async fn refresh(&self, session: &AuthSession) -> Result<AuthSession, AuthError>;

    /// Resolve role and team for the session's user.
    async fn load_profile(&self, session: &AuthSession) -> Result<CachedUser, AuthError>;

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError>;
}

/// Extract the token from an `Authorization: Bearer …` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

//! The `Notifier` trait: the contract every delivery channel must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{NotifyError, SubmissionSummary};

/// Outbound channel an outbox entry is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sheet,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Sheet => write!(f, "sheet"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "sheet" => Ok(Self::Sheet),
            other   => Err(format!("unknown notification channel: {other}")),
        }
    }
}

/// A single delivery handed to a notifier.
#[derive(Debug, Clone)]
pub struct Notification {
    /// ID of the outbox entry being delivered.
    pub id: uuid::Uuid,
    pub channel: Channel,
    /// Stable per (update, channel); remote endpoints may use it to drop
    /// duplicate deliveries after a retry.
    pub idempotency_key: String,
    pub summary: SubmissionSummary,
}

/// The core notifier trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// The channel this notifier serves.
    fn channel(&self) -> Channel;

    /// Deliver one notification.
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

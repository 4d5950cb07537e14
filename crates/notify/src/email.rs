//! Template-based transactional email over a JSON HTTP API.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument};

use crate::{Channel, Notification, Notifier, NotifyError};

/// Default send endpoint of the hosted email API.
pub const DEFAULT_EMAIL_API_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
    /// Used when the submitter's team has no manager email on record.
    pub fallback_recipient: Option<String>,
}

pub struct EmailNotifier {
    client: reqwest::Client,
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(client: reqwest::Client, config: EmailConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    #[instrument(skip(self, notification), fields(update_id = %notification.summary.update_id))]
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let summary = &notification.summary;
        let recipient = summary
            .manager_email
            .clone()
            .or_else(|| self.config.fallback_recipient.clone())
            .ok_or_else(|| NotifyError::Fatal("no recipient for update email".into()))?;

        let body = json!({
            "service_id": self.config.service_id,
            "template_id": self.config.template_id,
            "user_id": self.config.public_key,
            "template_params": {
                "to_name": recipient,
                "to_email": recipient,
                "manager_email": recipient,
                "from_name": summary.employee_name,
                "from_email": summary.employee_email,
                "reply_to": summary.employee_email,
                "employee_name": summary.employee_name,
                "tasks_completed": summary.tasks_completed,
                "blockers": summary.blockers_text(),
                "status": summary.status,
                "notes": summary.notes_text(),
                "date": summary.display_date(),
                "team": summary.team_name,
                "message": summary.message(),
            },
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .header("Idempotency-Key", &notification.idempotency_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::from_status(status, &text));
        }

        debug!("update email accepted for {recipient}");
        Ok(())
    }
}

//! Spreadsheet webhook: a form-encoded POST per submission.

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{Channel, Notification, Notifier, NotifyError};

pub struct SheetNotifier {
    client: reqwest::Client,
    url: String,
}

impl SheetNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl Notifier for SheetNotifier {
    fn channel(&self) -> Channel {
        Channel::Sheet
    }

    #[instrument(skip(self, notification), fields(update_id = %notification.summary.update_id))]
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let summary = &notification.summary;
        let blockers = if summary.blockers.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&summary.blockers)
                .map_err(|e| NotifyError::Fatal(e.to_string()))?
        };

        let form = [
            ("time", summary.submitted_at.to_rfc3339()),
            ("email", summary.employee_email.clone()),
            ("employee_name", summary.employee_name.clone()),
            ("employee_id", summary.employee_id.clone()),
            ("team", summary.team_name.clone()),
            ("tasks_completed", summary.tasks_completed.clone()),
            ("status", summary.status.clone()),
            ("blockers", blockers),
            ("notes", summary.additional_notes.clone().unwrap_or_default()),
            ("idempotency_key", notification.idempotency_key.clone()),
        ];

        let response = self.client.post(&self.url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::from_status(status, &text));
        }

        debug!("sheet webhook accepted update");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::summary::sample_summary;

    #[tokio::test]
    async fn posts_form_encoded_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/exec")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("email".into(), "asha@example.com".into()),
                Matcher::UrlEncoded("team".into(), "Platform".into()),
                Matcher::UrlEncoded("idempotency_key".into(), "u1:sheet".into()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let notifier = SheetNotifier::new(reqwest::Client::new(), format!("{}/exec", server.url()));
        let notification = Notification {
            id: uuid::Uuid::new_v4(),
            channel: Channel::Sheet,
            idempotency_key: "u1:sheet".into(),
            summary: sample_summary(),
        };

        notifier.deliver(&notification).await.expect("delivery should succeed");
        mock.assert_async().await;
    }
}

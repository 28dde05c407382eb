//! Notification transports.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use cadence_core::{Email, Notifier, TriggerResult};

use crate::error::{check_status, AdapterError};

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &Email) -> TriggerResult<()> {
        info!(
            subject = %email.subject,
            recipients = ?email.recipients,
            body = %email.body,
            "Notification"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    recipients: &'a [String],
    from: &'a str,
}

/// POSTs notifications as JSON to a webhook.
pub struct WebhookNotifier {
    url: String,
    from: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            from: from.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, email: &Email) -> Result<(), AdapterError> {
        let payload = WebhookPayload {
            subject: &email.subject,
            body: &email.body,
            recipients: &email.recipients,
            from: &self.from,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, email: &Email) -> TriggerResult<()> {
        self.post(email).await.map_err(AdapterError::into_notification)?;
        info!(subject = %email.subject, recipients = email.recipients.len(), "Sent notification");
        Ok(())
    }
}

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{ActionContext, TriggerAction};
use crate::error::TriggerResult;
use crate::notify::{Email, Notifier};
use crate::record;

/// Sends a fixed message through the notifier.
pub struct SendEmailAction {
    id: String,
    email: Email,
    notifier: Arc<dyn Notifier>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRecord {
    id: String,
    subject: String,
    body: String,
    #[serde(default)]
    recipients: Vec<String>,
}

impl SendEmailAction {
    pub const TYPE: &'static str = "SendEmailAction";

    pub fn new(id: impl Into<String>, email: Email, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            id: id.into(),
            email,
            notifier,
        }
    }

    pub fn from_record(value: &Value, notifier: Arc<dyn Notifier>) -> TriggerResult<Self> {
        let r: SendEmailRecord = record::decode(Self::TYPE, value)?;
        Ok(Self::new(r.id, Email::new(r.subject, r.body, r.recipients), notifier))
    }

    pub fn email(&self) -> &Email {
        &self.email
    }
}

impl fmt::Debug for SendEmailAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendEmailAction")
            .field("id", &self.id)
            .field("email", &self.email)
            .finish()
    }
}

#[async_trait]
impl TriggerAction for SendEmailAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn do_action(&self, _ctx: &mut ActionContext) -> TriggerResult<()> {
        if self.email.recipients.is_empty() {
            warn!(action = %self.id, subject = %self.email.subject, "No recipients, message dropped");
            return Ok(());
        }
        self.notifier.send(&self.email).await?;
        debug!(action = %self.id, recipients = self.email.recipients.len(), "Message sent");
        Ok(())
    }

    fn to_record(&self) -> TriggerResult<Value> {
        record::tagged(
            Self::TYPE,
            &SendEmailRecord {
                id: self.id.clone(),
                subject: self.email.subject.clone(),
                body: self.email.body.clone(),
                recipients: self.email.recipients.clone(),
            },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

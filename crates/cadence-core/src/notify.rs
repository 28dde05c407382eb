//! Outbound notification interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TriggerResult;

/// A message to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

impl Email {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            recipients,
        }
    }
}

/// Notification transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &Email) -> TriggerResult<()>;
}

//! Adapter error types.

use cadence_core::TriggerError;
use thiserror::Error;

/// Failures talking to an external service.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AdapterError {
    pub(crate) fn into_flow_backend(self) -> TriggerError {
        TriggerError::FlowBackend(self.to_string())
    }

    pub(crate) fn into_notification(self) -> TriggerError {
        TriggerError::Notification(self.to_string())
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AdapterError::InvalidResponse(e.to_string())
        } else {
            AdapterError::Network(e.to_string())
        }
    }
}

/// Turn a non-success response into [`AdapterError::Status`].
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AdapterError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(AdapterError::Status { status, message })
}

//! Error types for triggers, conditions, checkers and actions.

use thiserror::Error;

/// Errors raised while building, evaluating, firing or persisting triggers.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Condition expression could not be parsed.
    #[error("Expression parse error at offset {position}: {message}")]
    ExpressionParse { position: usize, message: String },

    /// Expression references a checker id that is not bound in the condition.
    #[error("Unbound checker identifier: {0}")]
    UnboundIdentifier(String),

    /// Expression calls a method the checker does not expose.
    #[error("Checker {checker} has no method {method}()")]
    UnknownMethod { checker: String, method: String },

    /// Persisted type tag was never registered.
    #[error("Unknown {kind} type: {tag}")]
    UnknownType { kind: &'static str, tag: String },

    /// Time advancement did not reach the present within the allowed increments.
    #[error("{0} increments of period did not reach the present time")]
    AdvanceLimitExceeded(u32),

    /// Period string is malformed.
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Cron expression is malformed.
    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },

    /// Timezone id is not a known IANA zone.
    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    /// Local wall-clock time could not be mapped to an instant.
    #[error("Local time {0} does not exist in the configured timezone")]
    InvalidLocalTime(String),

    /// Persisted record is missing fields or has the wrong shape.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Flow execution backend failure.
    #[error("Flow backend error: {0}")]
    FlowBackend(String),

    /// Notification transport failure.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Action failed for a reason of its own.
    #[error("Action {action} failed: {message}")]
    ActionFailed { action: String, message: String },

    /// A value an action expected in the firing context is absent.
    #[error("Missing context value: {0}")]
    MissingContext(String),

    /// Persistence layer failure.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TriggerError {
    /// Whether the error is a configuration error that must be surfaced to the caller
    /// rather than retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ExpressionParse { .. }
                | Self::UnboundIdentifier(_)
                | Self::UnknownMethod { .. }
                | Self::UnknownType { .. }
                | Self::AdvanceLimitExceeded(_)
                | Self::InvalidPeriod(_)
                | Self::InvalidCron { .. }
                | Self::InvalidTimezone(_)
                | Self::InvalidLocalTime(_)
                | Self::MalformedRecord(_)
        )
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord(message.into())
    }
}

/// Result type for trigger operations.
pub type TriggerResult<T> = Result<T, TriggerError>;

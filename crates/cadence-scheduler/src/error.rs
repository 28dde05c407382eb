//! Error types for the scheduler.

use thiserror::Error;

use cadence_core::{TriggerError, TriggerId};

/// Errors that can occur in the trigger manager and schedule projection.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scan loop is already running.
    #[error("Trigger manager is already running")]
    AlreadyRunning,

    /// The scan loop is not running.
    #[error("Trigger manager is not running")]
    NotRunning,

    /// No trigger with this id is loaded.
    #[error("Trigger not found: {0}")]
    TriggerNotFound(TriggerId),

    /// A trigger does not have the shape of a flow schedule.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// A persisted trigger could not be rebuilt.
    #[error("Failed to decode trigger {trigger_id:?}: {source}")]
    Decode {
        trigger_id: Option<TriggerId>,
        #[source]
        source: TriggerError,
    },

    /// Trigger, checker, action or persistence error.
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

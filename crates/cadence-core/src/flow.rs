//! Flow execution backend interface.
//!
//! The engine decides when flows run; the backend runs them. Actions submit and cancel
//! executions through [`FlowExecutor`], and checkers poll execution state through it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TriggerResult;

/// Execution id assigned by the backend.
pub type ExecutionId = i64;

/// Status of a flow execution or one of its jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ready,
    Preparing,
    Running,
    Paused,
    Succeeded,
    Killing,
    Killed,
    Failed,
    FailedFinishing,
    Skipped,
    Disabled,
    Cancelled,
}

impl Status {
    /// Terminal states for SLA purposes.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Killed)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Killed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "READY",
            Self::Preparing => "PREPARING",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Succeeded => "SUCCEEDED",
            Self::Killing => "KILLING",
            Self::Killed => "KILLED",
            Self::Failed => "FAILED",
            Self::FailedFinishing => "FAILED_FINISHING",
            Self::Skipped => "SKIPPED",
            Self::Disabled => "DISABLED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// What to do when a flow is submitted while another execution of it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrentOption {
    #[default]
    Skip,
    Ignore,
    Pipeline,
}

/// Per-execution overrides carried by execute-flow actions and schedules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOptions {
    #[serde(default)]
    pub failure_emails: Vec<String>,
    #[serde(default)]
    pub success_emails: Vec<String>,
    #[serde(default)]
    pub flow_parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub concurrent_option: ConcurrentOption,
    #[serde(default)]
    pub notify_on_first_failure: bool,
}

/// Request to run a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSubmission {
    pub project_id: i64,
    pub project_name: String,
    pub flow_name: String,
    pub submit_user: String,
    #[serde(default)]
    pub options: ExecutionOptions,
}

/// State of one job inside an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableNode {
    pub status: Status,
    #[serde(default, with = "ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub end_time: Option<DateTime<Utc>>,
}

/// State of an execution as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableFlow {
    pub execution_id: ExecutionId,
    pub project_id: i64,
    pub flow_id: String,
    pub status: Status,
    #[serde(with = "ts_milliseconds")]
    pub submit_time: DateTime<Utc>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub nodes: HashMap<String, ExecutableNode>,
}

impl ExecutableFlow {
    pub fn node(&self, job: &str) -> Option<&ExecutableNode> {
        self.nodes.get(job)
    }
}

/// Flow execution backend.
#[async_trait]
pub trait FlowExecutor: Send + Sync {
    /// Submit a flow for execution.
    async fn submit_flow(&self, submission: &FlowSubmission) -> TriggerResult<ExecutionId>;

    /// Fetch the current state of an execution.
    async fn get_flow(&self, execution_id: ExecutionId) -> TriggerResult<ExecutableFlow>;

    /// Cancel a running execution.
    async fn cancel_flow(&self, execution_id: ExecutionId, user: &str) -> TriggerResult<()>;
}

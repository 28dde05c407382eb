//! SLA options attached to executions and schedules.

use serde::{Deserialize, Serialize};

use crate::flow::ExecutableFlow;
use crate::time::Period;

/// Source label of triggers created to watch SLAs.
pub const SLA_TRIGGER_SOURCE: &str = "sla";

/// What the SLA watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlaType {
    FlowFinish,
    FlowSucceed,
    JobFinish,
    JobSucceed,
}

impl SlaType {
    pub fn is_flow_level(self) -> bool {
        matches!(self, Self::FlowFinish | Self::FlowSucceed)
    }

    /// Whether the SLA requires success rather than any terminal state.
    pub fn requires_success(self) -> bool {
        matches!(self, Self::FlowSucceed | Self::JobSucceed)
    }
}

/// What to do when the SLA is missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlaAction {
    SlaAlert,
    SlaCancelFlow,
    SlaKillJob,
}

/// One SLA rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaOption {
    pub sla_type: SlaType,
    pub flow_name: String,
    #[serde(default)]
    pub job_name: Option<String>,
    pub duration: Period,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub actions: Vec<SlaAction>,
}

impl SlaOption {
    pub fn new(sla_type: SlaType, flow_name: impl Into<String>, duration: Period) -> Self {
        Self {
            sla_type,
            flow_name: flow_name.into(),
            job_name: None,
            duration,
            emails: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_job(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self
    }

    pub fn with_emails(mut self, emails: Vec<String>) -> Self {
        self.emails = emails;
        self
    }

    pub fn with_action(mut self, action: SlaAction) -> Self {
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
        self
    }

    pub fn has_action(&self, action: SlaAction) -> bool {
        self.actions.contains(&action)
    }

    /// Alert subject line.
    pub fn alert_subject(&self, flow: &ExecutableFlow) -> String {
        format!(
            "SLA violation for {} on execution {}",
            self.target_name(),
            flow.execution_id
        )
    }

    /// Alert body describing the expectation and the observed status.
    pub fn alert_message(&self, flow: &ExecutableFlow) -> String {
        let rule = if self.sla_type.requires_success() {
            "SUCCEED"
        } else {
            "FINISH"
        };
        let started = flow
            .start_time
            .map(|t| t.format("%m/%d, %Y %H:%M").to_string())
            .unwrap_or_else(|| "not started".to_string());
        let status = match (&self.job_name, self.sla_type.is_flow_level()) {
            (Some(job), false) => flow
                .node(job)
                .map(|n| n.status.to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            _ => flow.status.to_string(),
        };
        format!(
            "SLA Alert: {} failed to {rule} within {} in execution {} (started {started}). \
             Actual status is {status}.",
            self.target_name(),
            self.duration,
            flow.execution_id,
        )
    }

    fn target_name(&self) -> String {
        match (&self.job_name, self.sla_type.is_flow_level()) {
            (Some(job), false) => format!("job {job}"),
            _ => format!("flow {}", self.flow_name),
        }
    }
}

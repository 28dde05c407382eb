//! Trigger actions: side effects run when a trigger fires.
//!
//! Actions of one firing cycle share an [`ActionContext`]. An action may publish values
//! for later actions in the same cycle and may queue [`TriggerRequest`]s, which the
//! owner of the trigger applies after the cycle completes.

mod create_trigger;
mod execute_flow;
mod kill_execution;
mod send_email;
mod sla_alert;
mod watch_sla;

pub use create_trigger::CreateTriggerAction;
pub use execute_flow::ExecuteFlowAction;
pub use kill_execution::KillExecutionAction;
pub use send_email::SendEmailAction;
pub use sla_alert::SlaAlertAction;
pub use watch_sla::WatchSlaAction;

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{TriggerError, TriggerResult};
use crate::flow::ExecutionId;
use crate::record::TriggerRecord;
use crate::trigger::{Trigger, TriggerId};

/// Context key under which an execute-flow action publishes its execution id.
pub const EXEC_ID_KEY: &str = "execId";

/// A side effect executed when a trigger fires.
#[async_trait]
pub trait TriggerAction: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn type_tag(&self) -> &str;

    /// Perform the side effect.
    async fn do_action(&self, ctx: &mut ActionContext) -> TriggerResult<()>;

    fn to_record(&self) -> TriggerResult<Value>;

    fn as_any(&self) -> &dyn Any;
}

/// Request produced by an action for the trigger's owner to apply.
#[derive(Debug)]
pub enum TriggerRequest {
    /// Insert a fully built trigger.
    Insert(Box<Trigger>),
    /// Decode and insert a persisted trigger record.
    InsertRecord(Box<TriggerRecord>),
}

/// State shared by the actions of one firing cycle.
#[derive(Debug)]
pub struct ActionContext {
    cycle_id: Uuid,
    trigger_id: Option<TriggerId>,
    submit_user: String,
    now: DateTime<Utc>,
    values: HashMap<String, Value>,
    requests: Vec<TriggerRequest>,
}

impl ActionContext {
    pub fn new(trigger_id: Option<TriggerId>, submit_user: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            trigger_id,
            submit_user: submit_user.into(),
            now,
            values: HashMap::new(),
            requests: Vec::new(),
        }
    }

    pub fn cycle_id(&self) -> Uuid {
        self.cycle_id
    }

    pub fn trigger_id(&self) -> Option<TriggerId> {
        self.trigger_id
    }

    pub fn submit_user(&self) -> &str {
        &self.submit_user
    }

    /// Instant the cycle started.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Execution id published by the action `action_id` in this cycle.
    pub fn execution_id(&self, action_id: &str) -> TriggerResult<ExecutionId> {
        self.values
            .get(action_id)
            .and_then(|v| v.get(EXEC_ID_KEY))
            .and_then(Value::as_i64)
            .ok_or_else(|| TriggerError::MissingContext(format!("{action_id}.{EXEC_ID_KEY}")))
    }

    /// Queue a request for the trigger's owner.
    pub fn request(&mut self, request: TriggerRequest) {
        self.requests.push(request);
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Take the queued requests.
    pub fn take_requests(&mut self) -> Vec<TriggerRequest> {
        std::mem::take(&mut self.requests)
    }
}

/// Result of running one firing cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FiringOutcome {
    pub cycle_id: Uuid,
    pub fired_at: DateTime<Utc>,
    pub actions_run: usize,
    /// `(action id, error message)` for every action that failed.
    pub failures: Vec<(String, String)>,
}

impl FiringOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run actions in order. A failing action is logged and does not stop the others.
pub async fn run_actions(actions: &[Arc<dyn TriggerAction>], ctx: &mut ActionContext) -> FiringOutcome {
    let mut failures = Vec::new();
    for action in actions {
        match action.do_action(ctx).await {
            Ok(()) => debug!(
                cycle_id = %ctx.cycle_id,
                action = action.id(),
                action_type = action.type_tag(),
                "Action completed"
            ),
            Err(e) => {
                warn!(
                    cycle_id = %ctx.cycle_id,
                    trigger_id = ?ctx.trigger_id,
                    action = action.id(),
                    action_type = action.type_tag(),
                    error = %e,
                    "Action failed"
                );
                failures.push((action.id().to_string(), e.to_string()));
            }
        }
    }
    FiringOutcome {
        cycle_id: ctx.cycle_id,
        fired_at: ctx.now,
        actions_run: actions.len(),
        failures,
    }
}

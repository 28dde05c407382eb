//! SLA checker: a flow or job must reach a state within a duration of starting.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CheckerValue, ConditionChecker};
use crate::error::{TriggerError, TriggerResult};
use crate::flow::{ExecutionId, FlowExecutor, Status};
use crate::record;
use crate::sla::SlaOption;

#[cfg(test)]
#[path = "sla_checker_tests.rs"]
mod tests;

/// Watches one execution against one [`SlaOption`].
///
/// The check time is the watched flow's (or job's) start time plus the SLA duration. It
/// is learned from the backend on the first evaluation after the start, and is reported
/// as this checker's next check time.
///
/// Expression methods: `isSlaFailed()` (also `eval()`) and `isSlaPassed()`.
pub struct SlaChecker {
    id: String,
    option: SlaOption,
    execution_id: ExecutionId,
    check_time: Option<DateTime<Utc>>,
    executor: Arc<dyn FlowExecutor>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlaCheckerRecord {
    id: String,
    sla_option: SlaOption,
    exec_id: ExecutionId,
}

impl SlaChecker {
    pub const TYPE: &'static str = "SlaChecker";

    pub fn new(
        id: impl Into<String>,
        option: SlaOption,
        execution_id: ExecutionId,
        executor: Arc<dyn FlowExecutor>,
    ) -> Self {
        Self {
            id: id.into(),
            option,
            execution_id,
            check_time: None,
            executor,
        }
    }

    pub fn from_record(value: &serde_json::Value, executor: Arc<dyn FlowExecutor>) -> TriggerResult<Self> {
        let r: SlaCheckerRecord = record::decode(Self::TYPE, value)?;
        Ok(Self::new(r.id, r.sla_option, r.exec_id, executor))
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn option(&self) -> &SlaOption {
        &self.option
    }

    /// Fetch the watched status, updating the check time. `None` until started.
    async fn observe(&mut self) -> TriggerResult<Option<Status>> {
        let flow = self.executor.get_flow(self.execution_id).await?;
        let (start, status) = match (&self.option.job_name, self.option.sla_type.is_flow_level()) {
            (Some(job), false) => {
                let node = flow.node(job).ok_or_else(|| {
                    TriggerError::FlowBackend(format!(
                        "job {job} not found in execution {}",
                        self.execution_id
                    ))
                })?;
                (node.start_time, node.status)
            }
            _ => (flow.start_time, flow.status),
        };
        let Some(start) = start else {
            return Ok(None);
        };
        let deadline = self.option.duration.add_to(start, chrono_tz::UTC)?;
        if self.check_time.is_none_or(|t| t < deadline) {
            debug!(checker = %self.id, execution_id = self.execution_id, %deadline, "SLA check time updated");
            self.check_time = Some(deadline);
        }
        Ok(Some(status))
    }

    fn target_reached(&self, status: Status) -> bool {
        if self.option.sla_type.requires_success() {
            status == Status::Succeeded
        } else {
            status.is_finished()
        }
    }

    /// True when the deadline passed without reaching the target, or when a
    /// success-type SLA already failed.
    pub async fn is_sla_failed(&mut self, now: DateTime<Utc>) -> TriggerResult<bool> {
        let Some(status) = self.observe().await? else {
            return Ok(false);
        };
        let past_deadline = self.check_time.is_some_and(|t| now > t);
        if past_deadline {
            Ok(!self.target_reached(status))
        } else {
            Ok(self.option.sla_type.requires_success() && status.is_failure())
        }
    }

    /// True once the target state is reached.
    pub async fn is_sla_passed(&mut self) -> TriggerResult<bool> {
        Ok(self
            .observe()
            .await?
            .is_some_and(|status| self.target_reached(status)))
    }
}

impl fmt::Debug for SlaChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlaChecker")
            .field("id", &self.id)
            .field("option", &self.option)
            .field("execution_id", &self.execution_id)
            .field("check_time", &self.check_time)
            .finish()
    }
}

#[async_trait]
impl ConditionChecker for SlaChecker {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn eval(&mut self, now: DateTime<Utc>) -> TriggerResult<CheckerValue> {
        self.is_sla_failed(now).await.map(CheckerValue::from)
    }

    async fn call(&mut self, method: &str, now: DateTime<Utc>) -> TriggerResult<CheckerValue> {
        match method {
            "eval" | "isSlaFailed" => self.eval(now).await,
            "isSlaPassed" => self.is_sla_passed().await.map(CheckerValue::from),
            other => Err(TriggerError::UnknownMethod {
                checker: self.id.clone(),
                method: other.to_string(),
            }),
        }
    }

    fn reset(&mut self, _now: DateTime<Utc>) -> TriggerResult<()> {
        Ok(())
    }

    fn next_check_time(&self) -> Option<DateTime<Utc>> {
        self.check_time
    }

    fn to_record(&self) -> TriggerResult<serde_json::Value> {
        record::tagged(
            Self::TYPE,
            &SlaCheckerRecord {
                id: self.id.clone(),
                sla_option: self.option.clone(),
                exec_id: self.execution_id,
            },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

//! Execution status checker.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CheckerValue, ConditionChecker};
use crate::error::{TriggerError, TriggerResult};
use crate::flow::{ExecutionId, FlowExecutor, Status};
use crate::record;

/// Status an execution (or one of its jobs) must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionTarget {
    Finished,
    Succeeded,
    Failed,
    Status(Status),
}

impl ExecutionTarget {
    pub fn matches(self, status: Status) -> bool {
        match self {
            Self::Finished => status.is_finished(),
            Self::Succeeded => status == Status::Succeeded,
            Self::Failed => status.is_failure(),
            Self::Status(expected) => status == expected,
        }
    }
}

/// True once an execution, or a named job within it, reaches the target status.
pub struct ExecutionChecker {
    id: String,
    execution_id: ExecutionId,
    job_name: Option<String>,
    target: ExecutionTarget,
    executor: Arc<dyn FlowExecutor>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionCheckerRecord {
    id: String,
    exec_id: ExecutionId,
    #[serde(default)]
    job_name: Option<String>,
    target: ExecutionTarget,
}

impl ExecutionChecker {
    pub const TYPE: &'static str = "ExecutionChecker";

    pub fn new(
        id: impl Into<String>,
        execution_id: ExecutionId,
        target: ExecutionTarget,
        executor: Arc<dyn FlowExecutor>,
    ) -> Self {
        Self {
            id: id.into(),
            execution_id,
            job_name: None,
            target,
            executor,
        }
    }

    pub fn for_job(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self
    }

    pub fn from_record(value: &serde_json::Value, executor: Arc<dyn FlowExecutor>) -> TriggerResult<Self> {
        let r: ExecutionCheckerRecord = record::decode(Self::TYPE, value)?;
        Ok(Self {
            id: r.id,
            execution_id: r.exec_id,
            job_name: r.job_name,
            target: r.target,
            executor,
        })
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn target(&self) -> ExecutionTarget {
        self.target
    }
}

impl fmt::Debug for ExecutionChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionChecker")
            .field("id", &self.id)
            .field("execution_id", &self.execution_id)
            .field("job_name", &self.job_name)
            .field("target", &self.target)
            .finish()
    }
}

#[async_trait]
impl ConditionChecker for ExecutionChecker {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn eval(&mut self, _now: DateTime<Utc>) -> TriggerResult<CheckerValue> {
        let flow = self.executor.get_flow(self.execution_id).await?;
        let status = match &self.job_name {
            Some(job) => {
                flow.node(job)
                    .ok_or_else(|| {
                        TriggerError::FlowBackend(format!(
                            "job {job} not found in execution {}",
                            self.execution_id
                        ))
                    })?
                    .status
            }
            None => flow.status,
        };
        Ok(self.target.matches(status).into())
    }

    fn reset(&mut self, _now: DateTime<Utc>) -> TriggerResult<()> {
        Ok(())
    }

    fn next_check_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn to_record(&self) -> TriggerResult<serde_json::Value> {
        record::tagged(
            Self::TYPE,
            &ExecutionCheckerRecord {
                id: self.id.clone(),
                exec_id: self.execution_id,
                job_name: self.job_name.clone(),
                target: self.target,
            },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{ActionContext, TriggerAction};
use crate::error::TriggerResult;
use crate::flow::{ExecutionId, FlowExecutor};
use crate::record;

/// Cancels an execution on behalf of the trigger's submitter.
pub struct KillExecutionAction {
    id: String,
    execution_id: ExecutionId,
    executor: Arc<dyn FlowExecutor>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KillExecutionRecord {
    id: String,
    exec_id: ExecutionId,
}

impl KillExecutionAction {
    pub const TYPE: &'static str = "KillExecutionAction";

    pub fn new(id: impl Into<String>, execution_id: ExecutionId, executor: Arc<dyn FlowExecutor>) -> Self {
        Self {
            id: id.into(),
            execution_id,
            executor,
        }
    }

    pub fn from_record(value: &Value, executor: Arc<dyn FlowExecutor>) -> TriggerResult<Self> {
        let r: KillExecutionRecord = record::decode(Self::TYPE, value)?;
        Ok(Self::new(r.id, r.exec_id, executor))
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }
}

impl fmt::Debug for KillExecutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KillExecutionAction")
            .field("id", &self.id)
            .field("execution_id", &self.execution_id)
            .finish()
    }
}

#[async_trait]
impl TriggerAction for KillExecutionAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn do_action(&self, ctx: &mut ActionContext) -> TriggerResult<()> {
        info!(action = %self.id, execution_id = self.execution_id, user = ctx.submit_user(), "Killing execution");
        self.executor
            .cancel_flow(self.execution_id, ctx.submit_user())
            .await
    }

    fn to_record(&self) -> TriggerResult<Value> {
        record::tagged(
            Self::TYPE,
            &KillExecutionRecord {
                id: self.id.clone(),
                exec_id: self.execution_id,
            },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

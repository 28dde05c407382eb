use std::any::Any;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ActionContext, TriggerAction, TriggerRequest};
use crate::error::TriggerResult;
use crate::record::{self, TriggerRecord};
use crate::trigger::TriggerStatus;

/// Creates a new trigger from a stored template each time it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTriggerAction {
    id: String,
    trigger: TriggerRecord,
}

impl CreateTriggerAction {
    pub const TYPE: &'static str = "CreateTriggerAction";

    pub fn new(id: impl Into<String>, template: TriggerRecord) -> Self {
        Self {
            id: id.into(),
            trigger: template,
        }
    }

    pub fn from_record(value: &Value) -> TriggerResult<Self> {
        record::decode(Self::TYPE, value)
    }

    pub fn template(&self) -> &TriggerRecord {
        &self.trigger
    }
}

#[async_trait]
impl TriggerAction for CreateTriggerAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn do_action(&self, ctx: &mut ActionContext) -> TriggerResult<()> {
        let now = ctx.now();
        let mut record = self.trigger.clone();
        record.trigger_id = None;
        record.status = TriggerStatus::Ready;
        record.create_time = now;
        record.submit_time = now;
        record.last_modify_time = now;
        debug!(action = %self.id, source = %record.source, "Queueing trigger from template");
        ctx.request(TriggerRequest::InsertRecord(Box::new(record)));
        Ok(())
    }

    fn to_record(&self) -> TriggerResult<Value> {
        record::tagged(Self::TYPE, self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{ActionContext, TriggerAction};
use crate::error::TriggerResult;
use crate::flow::{ExecutionId, FlowExecutor};
use crate::notify::{Email, Notifier};
use crate::record;
use crate::sla::SlaOption;

/// Notifies the SLA's recipients that an execution missed it.
///
/// The message is rendered at fire time from the execution's current state.
pub struct SlaAlertAction {
    id: String,
    option: SlaOption,
    execution_id: ExecutionId,
    executor: Arc<dyn FlowExecutor>,
    notifier: Arc<dyn Notifier>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlaAlertRecord {
    id: String,
    sla_option: SlaOption,
    exec_id: ExecutionId,
}

impl SlaAlertAction {
    pub const TYPE: &'static str = "SlaAlertAction";

    pub fn new(
        id: impl Into<String>,
        option: SlaOption,
        execution_id: ExecutionId,
        executor: Arc<dyn FlowExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            id: id.into(),
            option,
            execution_id,
            executor,
            notifier,
        }
    }

    pub fn from_record(
        value: &Value,
        executor: Arc<dyn FlowExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> TriggerResult<Self> {
        let r: SlaAlertRecord = record::decode(Self::TYPE, value)?;
        Ok(Self::new(r.id, r.sla_option, r.exec_id, executor, notifier))
    }

    pub fn option(&self) -> &SlaOption {
        &self.option
    }
}

impl fmt::Debug for SlaAlertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlaAlertAction")
            .field("id", &self.id)
            .field("option", &self.option)
            .field("execution_id", &self.execution_id)
            .finish()
    }
}

#[async_trait]
impl TriggerAction for SlaAlertAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn do_action(&self, _ctx: &mut ActionContext) -> TriggerResult<()> {
        if self.option.emails.is_empty() {
            warn!(action = %self.id, execution_id = self.execution_id, "SLA missed but no alert recipients");
            return Ok(());
        }
        let flow = self.executor.get_flow(self.execution_id).await?;
        let email = Email::new(
            self.option.alert_subject(&flow),
            self.option.alert_message(&flow),
            self.option.emails.clone(),
        );
        info!(action = %self.id, execution_id = self.execution_id, "Sending SLA alert");
        self.notifier.send(&email).await
    }

    fn to_record(&self) -> TriggerResult<Value> {
        record::tagged(
            Self::TYPE,
            &SlaAlertRecord {
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

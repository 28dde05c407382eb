use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{ActionContext, KillExecutionAction, SendEmailAction, TriggerAction, TriggerRequest};
use crate::checker::{ExecutionChecker, ExecutionTarget, TimeChecker};
use crate::condition::Condition;
use crate::error::TriggerResult;
use crate::flow::{ExecutableFlow, FlowExecutor};
use crate::notify::{Email, Notifier};
use crate::record;
use crate::sla::{SlaAction, SlaOption, SLA_TRIGGER_SOURCE};
use crate::trigger::{Trigger, MONITORED_EXECUTION_KEY};

/// Watches the execution started earlier in the same firing cycle.
///
/// Must run after the execute-flow action named by `execution_action_id`. Each flow-level
/// SLA option becomes a trigger that fires when the deadline (submit time plus the SLA
/// duration) passes before the execution reaches the option's target status.
pub struct WatchSlaAction {
    id: String,
    execution_action_id: String,
    sla_options: Vec<SlaOption>,
    executor: Arc<dyn FlowExecutor>,
    notifier: Arc<dyn Notifier>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchSlaRecord {
    id: String,
    execution_action_id: String,
    #[serde(default)]
    sla_options: Vec<SlaOption>,
}

impl WatchSlaAction {
    pub const TYPE: &'static str = "WatchSlaAction";

    pub fn new(
        id: impl Into<String>,
        execution_action_id: impl Into<String>,
        sla_options: Vec<SlaOption>,
        executor: Arc<dyn FlowExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            id: id.into(),
            execution_action_id: execution_action_id.into(),
            sla_options,
            executor,
            notifier,
        }
    }

    pub fn from_record(
        value: &Value,
        executor: Arc<dyn FlowExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> TriggerResult<Self> {
        let r: WatchSlaRecord = record::decode(Self::TYPE, value)?;
        Ok(Self::new(
            r.id,
            r.execution_action_id,
            r.sla_options,
            executor,
            notifier,
        ))
    }

    pub fn execution_action_id(&self) -> &str {
        &self.execution_action_id
    }

    fn watch_trigger(
        &self,
        option: &SlaOption,
        flow: &ExecutableFlow,
        submit_user: &str,
        now: DateTime<Utc>,
    ) -> TriggerResult<Trigger> {
        let deadline = option.duration.add_to(flow.submit_time, chrono_tz::UTC)?;
        let timer = TimeChecker::builder("slaTimer", deadline)
            .recurring(false)
            .skip_past_occurrences(false)
            .build(now)?;
        let target = if option.sla_type.requires_success() {
            ExecutionTarget::Succeeded
        } else {
            ExecutionTarget::Finished
        };
        let status = || {
            ExecutionChecker::new("slaStatus", flow.execution_id, target, self.executor.clone())
        };

        let trigger_condition = Condition::new(
            vec![Box::new(timer), Box::new(status())],
            "slaTimer.eval() && !slaStatus.eval()",
        );
        let expire_condition = Condition::new(vec![Box::new(status())], "slaStatus.eval()");

        let email = Email::new(
            format!("SLA missed for flow {} on execution {}", option.flow_name, flow.execution_id),
            format!(
                "Flow {} did not reach {target:?} within {} of submission (execution {}).",
                option.flow_name, option.duration, flow.execution_id
            ),
            option.emails.clone(),
        );
        let mut builder = Trigger::builder(
            SLA_TRIGGER_SOURCE,
            submit_user,
            trigger_condition,
            expire_condition,
        )
        .reset_on_trigger(false)
        .reset_on_expire(false)
        .info(MONITORED_EXECUTION_KEY, flow.execution_id.to_string())
        .action(SendEmailAction::new("slaEmail", email, self.notifier.clone()));
        if option.has_action(SlaAction::SlaCancelFlow) {
            builder = builder.action(KillExecutionAction::new(
                "killExecution",
                flow.execution_id,
                self.executor.clone(),
            ));
        }
        Ok(builder.build(now))
    }
}

impl fmt::Debug for WatchSlaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSlaAction")
            .field("id", &self.id)
            .field("execution_action_id", &self.execution_action_id)
            .field("sla_options", &self.sla_options)
            .finish()
    }
}

#[async_trait]
impl TriggerAction for WatchSlaAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn do_action(&self, ctx: &mut ActionContext) -> TriggerResult<()> {
        let execution_id = ctx.execution_id(&self.execution_action_id)?;
        let flow = self.executor.get_flow(execution_id).await?;
        let now = ctx.now();
        let submit_user = ctx.submit_user().to_string();
        for option in self.sla_options.iter().filter(|o| o.sla_type.is_flow_level()) {
            let trigger = self.watch_trigger(option, &flow, &submit_user, now)?;
            ctx.request(TriggerRequest::Insert(Box::new(trigger)));
        }
        let skipped = self
            .sla_options
            .iter()
            .filter(|o| !o.sla_type.is_flow_level())
            .count();
        if skipped > 0 {
            debug!(action = %self.id, skipped, "Job-level SLA options are watched by SLA checkers");
        }
        info!(action = %self.id, execution_id, "SLA watch armed");
        Ok(())
    }

    fn to_record(&self) -> TriggerResult<Value> {
        record::tagged(
            Self::TYPE,
            &WatchSlaRecord {
                id: self.id.clone(),
                execution_action_id: self.execution_action_id.clone(),
                sla_options: self.sla_options.clone(),
            },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{
    ActionContext, KillExecutionAction, SlaAlertAction, TriggerAction, TriggerRequest, EXEC_ID_KEY,
};
use crate::checker::SlaChecker;
use crate::condition::Condition;
use crate::error::TriggerResult;
use crate::flow::{ExecutionId, ExecutionOptions, FlowExecutor, FlowSubmission};
use crate::notify::Notifier;
use crate::record;
use crate::sla::{SlaAction, SlaOption, SLA_TRIGGER_SOURCE};
use crate::trigger::{Trigger, MONITORED_EXECUTION_KEY};

/// Submits a flow and arms one SLA trigger per SLA option.
pub struct ExecuteFlowAction {
    id: String,
    project_id: i64,
    project_name: String,
    flow_name: String,
    submit_user: String,
    options: ExecutionOptions,
    sla_options: Vec<SlaOption>,
    executor: Arc<dyn FlowExecutor>,
    notifier: Arc<dyn Notifier>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteFlowRecord {
    id: String,
    project_id: i64,
    project_name: String,
    flow_name: String,
    submit_user: String,
    #[serde(default)]
    execution_options: ExecutionOptions,
    #[serde(default)]
    sla_options: Vec<SlaOption>,
}

impl ExecuteFlowAction {
    pub const TYPE: &'static str = "ExecuteFlowAction";

    pub fn new(
        id: impl Into<String>,
        project_id: i64,
        project_name: impl Into<String>,
        flow_name: impl Into<String>,
        submit_user: impl Into<String>,
        executor: Arc<dyn FlowExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id,
            project_name: project_name.into(),
            flow_name: flow_name.into(),
            submit_user: submit_user.into(),
            options: ExecutionOptions::default(),
            sla_options: Vec::new(),
            executor,
            notifier,
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sla_options(mut self, sla_options: Vec<SlaOption>) -> Self {
        self.sla_options = sla_options;
        self
    }

    pub fn from_record(
        value: &Value,
        executor: Arc<dyn FlowExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> TriggerResult<Self> {
        let r: ExecuteFlowRecord = record::decode(Self::TYPE, value)?;
        Ok(Self::new(
            r.id,
            r.project_id,
            r.project_name,
            r.flow_name,
            r.submit_user,
            executor,
            notifier,
        )
        .with_options(r.execution_options)
        .with_sla_options(r.sla_options))
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn flow_name(&self) -> &str {
        &self.flow_name
    }

    pub fn submit_user(&self) -> &str {
        &self.submit_user
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn sla_options(&self) -> &[SlaOption] {
        &self.sla_options
    }

    fn sla_trigger(
        &self,
        option: &SlaOption,
        execution_id: ExecutionId,
        now: DateTime<Utc>,
    ) -> Trigger {
        let checker = |id: &str| {
            SlaChecker::new(id, option.clone(), execution_id, self.executor.clone())
        };
        let trigger_condition = Condition::new(
            vec![Box::new(checker("slaFailChecker"))],
            "slaFailChecker.isSlaFailed()",
        );
        let expire_condition = Condition::new(
            vec![Box::new(checker("slaPassChecker"))],
            "slaPassChecker.isSlaPassed()",
        );
        let mut builder = Trigger::builder(
            SLA_TRIGGER_SOURCE,
            self.submit_user.clone(),
            trigger_condition,
            expire_condition,
        )
        .reset_on_trigger(false)
        .reset_on_expire(false)
        .info(MONITORED_EXECUTION_KEY, execution_id.to_string())
        .description(format!("SLA for execution {execution_id} of {}", self.flow_name));
        if option.has_action(SlaAction::SlaAlert) {
            builder = builder.action(SlaAlertAction::new(
                "slaAlert",
                option.clone(),
                execution_id,
                self.executor.clone(),
                self.notifier.clone(),
            ));
        }
        if option.has_action(SlaAction::SlaCancelFlow) {
            builder = builder.action(KillExecutionAction::new(
                "killExecution",
                execution_id,
                self.executor.clone(),
            ));
        }
        builder.build(now)
    }
}

impl fmt::Debug for ExecuteFlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteFlowAction")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("project_name", &self.project_name)
            .field("flow_name", &self.flow_name)
            .field("submit_user", &self.submit_user)
            .field("sla_options", &self.sla_options.len())
            .finish()
    }
}

#[async_trait]
impl TriggerAction for ExecuteFlowAction {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn do_action(&self, ctx: &mut ActionContext) -> TriggerResult<()> {
        let submission = FlowSubmission {
            project_id: self.project_id,
            project_name: self.project_name.clone(),
            flow_name: self.flow_name.clone(),
            submit_user: self.submit_user.clone(),
            options: self.options.clone(),
        };
        let execution_id = self.executor.submit_flow(&submission).await?;
        info!(
            action = %self.id,
            project = %self.project_name,
            flow = %self.flow_name,
            execution_id,
            "Flow submitted"
        );
        ctx.insert(self.id.clone(), json!({ EXEC_ID_KEY: execution_id }));

        for option in &self.sla_options {
            let trigger = self.sla_trigger(option, execution_id, ctx.now());
            ctx.request(TriggerRequest::Insert(Box::new(trigger)));
        }
        Ok(())
    }

    fn to_record(&self) -> TriggerResult<Value> {
        record::tagged(
            Self::TYPE,
            &ExecuteFlowRecord {
                id: self.id.clone(),
                project_id: self.project_id,
                project_name: self.project_name.clone(),
                flow_name: self.flow_name.clone(),
                submit_user: self.submit_user.clone(),
                execution_options: self.options.clone(),
                sla_options: self.sla_options.clone(),
            },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

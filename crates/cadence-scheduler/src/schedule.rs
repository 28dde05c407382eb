//! Flow schedules: a single-flow time trigger seen as a schedule record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use cadence_core::action::ExecuteFlowAction;
use cadence_core::flow::ExecutionOptions;
use cadence_core::time::serde_tz;
use cadence_core::{
    Collaborators, Condition, ConditionChecker, Period, SlaOption, TimeChecker, Trigger, TriggerId,
    TriggerStatus,
};

use crate::error::{SchedulerError, SchedulerResult};
use crate::manager::TriggerManager;

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;

/// Source label of schedule triggers.
pub const SCHEDULE_TRIGGER_SOURCE: &str = "SimpleTimeTrigger";
pub const TIME_CHECKER_ID: &str = "BasicTimeChecker_1";
pub const END_CHECKER_ID: &str = "EndTimeChecker_1";
pub const EXECUTE_ACTION_ID: &str = "executeFlowAction";

/// End time of schedules that never end: 2050-01-01T00:00:00Z.
pub fn default_end_time() -> DateTime<Utc> {
    DateTime::from_timestamp(2_524_608_000, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A recurring or one-shot flow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Id of the backing trigger, once stored.
    pub schedule_id: Option<TriggerId>,
    pub project_id: i64,
    pub project_name: String,
    pub flow_name: String,
    pub status: TriggerStatus,
    pub first_sched_time: DateTime<Utc>,
    pub next_exec_time: Option<DateTime<Utc>>,
    #[serde(with = "serde_tz")]
    pub timezone: Tz,
    pub period: Option<Period>,
    pub cron_expression: Option<String>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_modify_time: DateTime<Utc>,
    pub submit_time: DateTime<Utc>,
    pub submit_user: String,
    #[serde(default)]
    pub execution_options: ExecutionOptions,
    #[serde(default)]
    pub sla_options: Vec<SlaOption>,
}

impl Schedule {
    /// One-shot UTC schedule; add recurrence with [`with_period`](Self::with_period) or
    /// [`with_cron`](Self::with_cron).
    pub fn new(
        project_id: i64,
        project_name: impl Into<String>,
        flow_name: impl Into<String>,
        first_sched_time: DateTime<Utc>,
        submit_user: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            schedule_id: None,
            project_id,
            project_name: project_name.into(),
            flow_name: flow_name.into(),
            status: TriggerStatus::Ready,
            first_sched_time,
            next_exec_time: None,
            timezone: chrono_tz::UTC,
            period: None,
            cron_expression: None,
            end_time: None,
            last_modify_time: now,
            submit_time: now,
            submit_user: submit_user.into(),
            execution_options: ExecutionOptions::default(),
            sla_options: Vec::new(),
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_cron(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_execution_options(mut self, options: ExecutionOptions) -> Self {
        self.execution_options = options;
        self
    }

    pub fn with_sla_options(mut self, sla_options: Vec<SlaOption>) -> Self {
        self.sla_options = sla_options;
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.period.is_some() || self.cron_expression.is_some()
    }

    /// Build the backing trigger.
    pub fn to_trigger(&self, collaborators: &Collaborators, now: DateTime<Utc>) -> SchedulerResult<Trigger> {
        if self.period.is_some() && self.cron_expression.is_some() {
            return Err(SchedulerError::InvalidSchedule(format!(
                "schedule of {}.{} sets both a period and a cron expression",
                self.project_name, self.flow_name
            )));
        }

        let mut time = TimeChecker::builder(TIME_CHECKER_ID, self.first_sched_time)
            .timezone(self.timezone)
            .recurring(self.is_recurring())
            .skip_past_occurrences(true);
        if let Some(period) = self.period {
            time = time.period(period);
        }
        if let Some(cron) = &self.cron_expression {
            time = time.cron(cron.clone());
        }
        let time = time.build(now)?;
        let end = TimeChecker::builder(END_CHECKER_ID, self.end_time.unwrap_or_else(default_end_time))
            .timezone(self.timezone)
            .recurring(false)
            .skip_past_occurrences(false)
            .build(now)?;

        let action = ExecuteFlowAction::new(
            EXECUTE_ACTION_ID,
            self.project_id,
            &self.project_name,
            &self.flow_name,
            &self.submit_user,
            collaborators.flow_executor.clone(),
            collaborators.notifier.clone(),
        )
        .with_options(self.execution_options.clone())
        .with_sla_options(self.sla_options.clone());

        let mut trigger = Trigger::builder(
            SCHEDULE_TRIGGER_SOURCE,
            &self.submit_user,
            Condition::new(vec![Box::new(time)], format!("{TIME_CHECKER_ID}.eval()")),
            Condition::new(vec![Box::new(end)], format!("{END_CHECKER_ID}.eval()")),
        )
        .action(action)
        .reset_on_trigger(self.is_recurring())
        .reset_on_expire(false)
        .submit_time(self.submit_time)
        .description(format!("{}.{}", self.project_name, self.flow_name))
        .build(now);
        if let Some(id) = self.schedule_id {
            trigger.set_id(id);
        }
        if self.status != TriggerStatus::Ready {
            trigger.set_status(self.status, now);
        }
        Ok(trigger)
    }

    /// Read a schedule back out of its trigger.
    pub fn from_trigger(trigger: &Trigger) -> SchedulerResult<Self> {
        let invalid = |what: &str| {
            SchedulerError::InvalidSchedule(format!("trigger {:?} has no {what}", trigger.id()))
        };
        let time = trigger
            .trigger_condition()
            .checker_as::<TimeChecker>(TIME_CHECKER_ID)
            .ok_or_else(|| invalid(TIME_CHECKER_ID))?;
        let action = trigger
            .action_as::<ExecuteFlowAction>()
            .ok_or_else(|| invalid("execute-flow action"))?;
        let end_time = trigger
            .expire_condition()
            .checker_as::<TimeChecker>(END_CHECKER_ID)
            .map(TimeChecker::first_check_time)
            .filter(|end| *end != default_end_time());

        Ok(Self {
            schedule_id: trigger.id(),
            project_id: action.project_id(),
            project_name: action.project_name().to_string(),
            flow_name: action.flow_name().to_string(),
            status: trigger.status(),
            first_sched_time: time.first_check_time(),
            next_exec_time: time.next_check_time(),
            timezone: time.timezone(),
            period: time.period(),
            cron_expression: time.cron_expression().map(str::to_string),
            end_time,
            last_modify_time: trigger.last_modify_time(),
            submit_time: trigger.submit_time(),
            submit_user: trigger.submit_user().to_string(),
            execution_options: action.options().clone(),
            sla_options: action.sla_options().to_vec(),
        })
    }

    fn matches(&self, project_id: i64, flow_name: &str) -> bool {
        self.project_id == project_id && self.flow_name == flow_name
    }
}

/// Schedules stored as triggers of a [`TriggerManager`].
pub struct ScheduleManager {
    manager: Arc<TriggerManager>,
    collaborators: Collaborators,
    /// Serializes replace-on-schedule.
    write_lock: Mutex<()>,
}

impl ScheduleManager {
    pub fn new(manager: Arc<TriggerManager>, collaborators: Collaborators) -> Self {
        Self {
            manager,
            collaborators,
            write_lock: Mutex::new(()),
        }
    }

    pub fn trigger_manager(&self) -> &Arc<TriggerManager> {
        &self.manager
    }

    /// Store `schedule`, replacing any schedule of the same project and flow.
    pub async fn schedule_flow(&self, schedule: Schedule) -> SchedulerResult<Schedule> {
        let _write = self.write_lock.lock().await;
        let now = Utc::now();
        let trigger = schedule.to_trigger(&self.collaborators, now)?;

        for existing in self.find(schedule.project_id, &schedule.flow_name).await? {
            let id = existing.schedule_id.ok_or_else(|| {
                SchedulerError::Internal("loaded schedule trigger has no id".to_string())
            })?;
            info!(trigger_id = id, flow = %schedule.flow_name, "Replacing existing schedule");
            self.manager.remove_trigger(id).await?;
        }

        let next_exec_time = trigger.trigger_condition().next_check_time();
        let id = self.manager.insert_trigger(trigger).await?;
        info!(
            trigger_id = id,
            project = %schedule.project_name,
            flow = %schedule.flow_name,
            next_exec_time = ?next_exec_time,
            "Flow scheduled"
        );
        self.manager
            .with_trigger(id, Schedule::from_trigger)
            .await?
    }

    /// Remove the schedule of a flow. Returns whether one existed.
    pub async fn remove_schedule(&self, project_id: i64, flow_name: &str) -> SchedulerResult<bool> {
        let _write = self.write_lock.lock().await;
        let found = self.find(project_id, flow_name).await?;
        for schedule in &found {
            if let Some(id) = schedule.schedule_id {
                self.manager.remove_trigger(id).await?;
            }
        }
        if !found.is_empty() {
            info!(project_id, flow = %flow_name, "Schedule removed");
        }
        Ok(!found.is_empty())
    }

    /// Every schedule, ordered by id.
    pub async fn get_schedules(&self) -> SchedulerResult<Vec<Schedule>> {
        let mut schedules = Vec::new();
        for id in self.manager.trigger_ids(Some(SCHEDULE_TRIGGER_SOURCE)) {
            match self.manager.with_trigger(id, Schedule::from_trigger).await {
                Ok(Ok(schedule)) => schedules.push(schedule),
                Ok(Err(e)) => warn!(trigger_id = id, error = %e, "Skipping malformed schedule trigger"),
                // Removed since the id list was taken.
                Err(SchedulerError::TriggerNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(schedules)
    }

    pub async fn get_schedule(&self, project_id: i64, flow_name: &str) -> SchedulerResult<Option<Schedule>> {
        Ok(self.find(project_id, flow_name).await?.into_iter().next())
    }

    pub async fn get_schedule_by_id(&self, id: TriggerId) -> SchedulerResult<Option<Schedule>> {
        match self.manager.with_trigger(id, Schedule::from_trigger).await {
            Ok(Ok(schedule)) => Ok(Some(schedule)),
            Ok(Err(_)) | Err(SchedulerError::TriggerNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find(&self, project_id: i64, flow_name: &str) -> SchedulerResult<Vec<Schedule>> {
        Ok(self
            .get_schedules()
            .await?
            .into_iter()
            .filter(|s| s.matches(project_id, flow_name))
            .collect())
    }
}

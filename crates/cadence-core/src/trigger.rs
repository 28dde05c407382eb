//! Trigger: a fire condition, an expire condition, actions and a status machine.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::{run_actions, ActionContext, FiringOutcome, TriggerAction};
use crate::condition::Condition;
use crate::error::TriggerResult;
use crate::flow::ExecutionId;
use crate::record::TriggerRecord;
use crate::registry::Registries;

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;

/// Trigger id assigned by the persistence layer.
pub type TriggerId = i64;

/// Info key naming an execution whose completion should prompt an early check.
pub const MONITORED_EXECUTION_KEY: &str = "monitored.finished.execution";

/// Trigger lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerStatus {
    /// Armed and scanned.
    Ready,
    /// Expire condition met, or a one-shot trigger has fired.
    Expired,
    /// Administratively suspended.
    Paused,
}

impl fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "READY",
            Self::Expired => "EXPIRED",
            Self::Paused => "PAUSED",
        })
    }
}

/// What a scan tick decided for a trigger.
#[derive(Debug)]
pub enum Verdict {
    /// Nothing to do.
    Idle,
    /// Expire condition met; run these expire actions, then [`Trigger::complete_expire`].
    Expire(Vec<Arc<dyn TriggerAction>>),
    /// Trigger condition met; run these actions, then [`Trigger::complete_fire`].
    Fire(Vec<Arc<dyn TriggerAction>>),
}

/// Result of a standalone [`Trigger::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Idle,
    Expired,
    Rearmed,
    Fired(FiringOutcome),
}

/// A unit of scheduling.
///
/// Each scan tick, a `READY` trigger first checks its expire condition. When met, it
/// either resets both conditions (`reset_on_expire`) or becomes `EXPIRED`. Otherwise, when
/// the trigger condition is met, its actions fire in order; afterwards it either resets the
/// trigger condition (`reset_on_trigger`) or becomes `EXPIRED`, so a latched checker cannot
/// fire it twice.
#[derive(Debug)]
pub struct Trigger {
    id: Option<TriggerId>,
    source: String,
    submit_user: String,
    description: Option<String>,
    create_time: DateTime<Utc>,
    submit_time: DateTime<Utc>,
    last_modify_time: DateTime<Utc>,
    trigger_condition: Condition,
    expire_condition: Condition,
    actions: Vec<Arc<dyn TriggerAction>>,
    expire_actions: Vec<Arc<dyn TriggerAction>>,
    reset_on_trigger: bool,
    reset_on_expire: bool,
    status: TriggerStatus,
    info: BTreeMap<String, String>,
    consecutive_failures: u32,
    last_outcome: Option<FiringOutcome>,
}

impl Trigger {
    pub fn builder(
        source: impl Into<String>,
        submit_user: impl Into<String>,
        trigger_condition: Condition,
        expire_condition: Condition,
    ) -> TriggerBuilder {
        TriggerBuilder {
            source: source.into(),
            submit_user: submit_user.into(),
            description: None,
            submit_time: None,
            trigger_condition,
            expire_condition,
            actions: Vec::new(),
            expire_actions: Vec::new(),
            reset_on_trigger: true,
            reset_on_expire: false,
            info: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Option<TriggerId> {
        self.id
    }

    pub fn set_id(&mut self, id: TriggerId) {
        self.id = Some(id);
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn submit_user(&self) -> &str {
        &self.submit_user
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }

    pub fn submit_time(&self) -> DateTime<Utc> {
        self.submit_time
    }

    pub fn last_modify_time(&self) -> DateTime<Utc> {
        self.last_modify_time
    }

    pub fn trigger_condition(&self) -> &Condition {
        &self.trigger_condition
    }

    pub fn trigger_condition_mut(&mut self) -> &mut Condition {
        &mut self.trigger_condition
    }

    pub fn expire_condition(&self) -> &Condition {
        &self.expire_condition
    }

    pub fn expire_condition_mut(&mut self) -> &mut Condition {
        &mut self.expire_condition
    }

    pub fn actions(&self) -> &[Arc<dyn TriggerAction>] {
        &self.actions
    }

    pub fn expire_actions(&self) -> &[Arc<dyn TriggerAction>] {
        &self.expire_actions
    }

    /// First action of type `T`.
    pub fn action_as<T: 'static>(&self) -> Option<&T> {
        self.actions.iter().find_map(|a| a.as_any().downcast_ref::<T>())
    }

    pub fn reset_on_trigger(&self) -> bool {
        self.reset_on_trigger
    }

    pub fn reset_on_expire(&self) -> bool {
        self.reset_on_expire
    }

    pub fn status(&self) -> TriggerStatus {
        self.status
    }

    pub fn info(&self) -> &BTreeMap<String, String> {
        &self.info
    }

    /// Execution whose completion should prompt an early check of this trigger.
    pub fn monitored_execution(&self) -> Option<ExecutionId> {
        self.info.get(MONITORED_EXECUTION_KEY).and_then(|v| v.parse().ok())
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_degraded(&self, threshold: u32) -> bool {
        threshold > 0 && self.consecutive_failures >= threshold
    }

    pub fn last_outcome(&self) -> Option<&FiringOutcome> {
        self.last_outcome.as_ref()
    }

    /// Earliest next-check time of either condition.
    pub fn next_check_time(&self) -> Option<DateTime<Utc>> {
        match (
            self.trigger_condition.next_check_time(),
            self.expire_condition.next_check_time(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Administrative status change.
    pub fn set_status(&mut self, status: TriggerStatus, now: DateTime<Utc>) {
        if self.status != status {
            info!(trigger_id = ?self.id, from = %self.status, to = %status, "Trigger status changed");
            self.status = status;
        }
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modify_time = now;
    }

    /// Decide what this tick does. Only `READY` triggers do anything.
    ///
    /// Errors count toward [`consecutive_failures`](Self::consecutive_failures); a clean
    /// evaluation clears the count.
    pub async fn evaluate(&mut self, now: DateTime<Utc>) -> TriggerResult<Verdict> {
        if self.status != TriggerStatus::Ready {
            return Ok(Verdict::Idle);
        }
        match self.evaluate_conditions(now).await {
            Ok(verdict) => {
                self.consecutive_failures = 0;
                Ok(verdict)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                Err(e)
            }
        }
    }

    async fn evaluate_conditions(&mut self, now: DateTime<Utc>) -> TriggerResult<Verdict> {
        if self.expire_condition.is_met(now).await? {
            let actions = if self.reset_on_expire {
                Vec::new()
            } else {
                self.expire_actions.clone()
            };
            return Ok(Verdict::Expire(actions));
        }
        if self.trigger_condition.is_met(now).await? {
            return Ok(Verdict::Fire(self.actions.clone()));
        }
        Ok(Verdict::Idle)
    }

    /// Apply the expire transition.
    pub fn complete_expire(&mut self, now: DateTime<Utc>) -> TriggerResult<()> {
        self.touch(now);
        if self.reset_on_expire {
            debug!(trigger_id = ?self.id, "Expire condition met, rearming");
            let trigger_reset = self.trigger_condition.reset_checkers(now);
            let expire_reset = self.expire_condition.reset_checkers(now);
            return self.pause_on_error(trigger_reset.and(expire_reset));
        }
        info!(trigger_id = ?self.id, source = %self.source, "Trigger expired");
        self.status = TriggerStatus::Expired;
        Ok(())
    }

    /// Apply the post-fire transition and record the cycle outcome.
    pub fn complete_fire(&mut self, now: DateTime<Utc>, outcome: FiringOutcome) -> TriggerResult<()> {
        self.touch(now);
        self.last_outcome = Some(outcome);
        if self.reset_on_trigger {
            let reset = self.trigger_condition.reset_checkers(now);
            return self.pause_on_error(reset);
        }
        debug!(trigger_id = ?self.id, "One-shot trigger consumed");
        self.status = TriggerStatus::Expired;
        Ok(())
    }

    /// A trigger whose checkers cannot rearm would fire on every tick; park it instead.
    fn pause_on_error(&mut self, result: TriggerResult<()>) -> TriggerResult<()> {
        if let Err(e) = &result {
            warn!(trigger_id = ?self.id, error = %e, "Checker reset failed, pausing trigger");
            self.status = TriggerStatus::Paused;
        }
        result
    }

    /// Run one full tick: evaluate, fire if due, apply the transition.
    pub async fn tick(&mut self, ctx: &mut ActionContext) -> TriggerResult<TickOutcome> {
        let now = ctx.now();
        match self.evaluate(now).await? {
            Verdict::Idle => Ok(TickOutcome::Idle),
            Verdict::Expire(actions) => {
                run_actions(&actions, ctx).await;
                self.complete_expire(now)?;
                Ok(if self.status == TriggerStatus::Ready {
                    TickOutcome::Rearmed
                } else {
                    TickOutcome::Expired
                })
            }
            Verdict::Fire(actions) => {
                let outcome = run_actions(&actions, ctx).await;
                self.complete_fire(now, outcome.clone())?;
                Ok(TickOutcome::Fired(outcome))
            }
        }
    }

    pub fn to_record(&self) -> TriggerResult<TriggerRecord> {
        Ok(TriggerRecord {
            trigger_id: self.id,
            source: self.source.clone(),
            submit_user: self.submit_user.clone(),
            create_time: self.create_time,
            submit_time: self.submit_time,
            last_modify_time: self.last_modify_time,
            trigger_condition: self.trigger_condition.to_record()?,
            expire_condition: self.expire_condition.to_record()?,
            actions: self
                .actions
                .iter()
                .map(|a| a.to_record())
                .collect::<TriggerResult<_>>()?,
            expire_actions: self
                .expire_actions
                .iter()
                .map(|a| a.to_record())
                .collect::<TriggerResult<_>>()?,
            reset_on_trigger: self.reset_on_trigger,
            reset_on_expire: self.reset_on_expire,
            status: self.status,
            info: self.info.clone(),
            description: self.description.clone(),
        })
    }

    pub fn from_record(
        record: &TriggerRecord,
        registries: &Registries,
        now: DateTime<Utc>,
    ) -> TriggerResult<Self> {
        let decode_actions = |values: &[serde_json::Value]| {
            values
                .iter()
                .map(|v| registries.actions.create(v, now).map(Arc::from))
                .collect::<TriggerResult<Vec<Arc<dyn TriggerAction>>>>()
        };
        Ok(Self {
            id: record.trigger_id,
            source: record.source.clone(),
            submit_user: record.submit_user.clone(),
            description: record.description.clone(),
            create_time: record.create_time,
            submit_time: record.submit_time,
            last_modify_time: record.last_modify_time,
            trigger_condition: Condition::from_record(
                &record.trigger_condition,
                &registries.checkers,
                now,
            )?,
            expire_condition: Condition::from_record(
                &record.expire_condition,
                &registries.checkers,
                now,
            )?,
            actions: decode_actions(&record.actions)?,
            expire_actions: decode_actions(&record.expire_actions)?,
            reset_on_trigger: record.reset_on_trigger,
            reset_on_expire: record.reset_on_expire,
            status: record.status,
            info: record.info.clone(),
            consecutive_failures: 0,
            last_outcome: None,
        })
    }
}

/// Builder for [`Trigger`].
pub struct TriggerBuilder {
    source: String,
    submit_user: String,
    description: Option<String>,
    submit_time: Option<DateTime<Utc>>,
    trigger_condition: Condition,
    expire_condition: Condition,
    actions: Vec<Arc<dyn TriggerAction>>,
    expire_actions: Vec<Arc<dyn TriggerAction>>,
    reset_on_trigger: bool,
    reset_on_expire: bool,
    info: BTreeMap<String, String>,
}

impl TriggerBuilder {
    pub fn action(mut self, action: impl TriggerAction + 'static) -> Self {
        self.actions.push(Arc::new(action));
        self
    }

    pub fn shared_action(mut self, action: Arc<dyn TriggerAction>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn expire_action(mut self, action: impl TriggerAction + 'static) -> Self {
        self.expire_actions.push(Arc::new(action));
        self
    }

    pub fn reset_on_trigger(mut self, reset: bool) -> Self {
        self.reset_on_trigger = reset;
        self
    }

    pub fn reset_on_expire(mut self, reset: bool) -> Self {
        self.reset_on_expire = reset;
        self
    }

    pub fn info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn submit_time(mut self, submit_time: DateTime<Utc>) -> Self {
        self.submit_time = Some(submit_time);
        self
    }

    pub fn build(self, now: DateTime<Utc>) -> Trigger {
        Trigger {
            id: None,
            source: self.source,
            submit_user: self.submit_user,
            description: self.description,
            create_time: now,
            submit_time: self.submit_time.unwrap_or(now),
            last_modify_time: now,
            trigger_condition: self.trigger_condition,
            expire_condition: self.expire_condition,
            actions: self.actions,
            expire_actions: self.expire_actions,
            reset_on_trigger: self.reset_on_trigger,
            reset_on_expire: self.reset_on_expire,
            status: TriggerStatus::Ready,
            info: self.info,
            consecutive_failures: 0,
            last_outcome: None,
        }
    }
}

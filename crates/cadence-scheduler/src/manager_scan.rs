//! Scan cycle: evaluate due triggers, fire them, persist and reschedule.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use cadence_core::action::run_actions;
use cadence_core::{ActionContext, Trigger, TriggerRequest, TriggerStatus, Verdict};

use crate::manager::{TriggerManager, TriggerSlot};

/// What one trigger check changed.
struct CheckResult {
    changed: bool,
    status: TriggerStatus,
    next_hint: Option<DateTime<Utc>>,
    requests: Vec<TriggerRequest>,
}

impl TriggerManager {
    /// Run one scan cycle as of `now`.
    ///
    /// Retries failed persistence writes, then checks every trigger due at or before
    /// `now`. A failure in one trigger never stops the others.
    pub async fn scan(&self, now: DateTime<Utc>) {
        let _cycle = self.scan_lock.lock().await;
        let started = Instant::now();

        self.flush_dirty().await;

        let due = self.collection.lock().queue.pop_due(now);
        if !due.is_empty() {
            debug!(count = due.len(), "Checking due triggers");
        }
        for id in due {
            if let Some(slot) = self.slot(id) {
                self.check_slot(&slot, now).await;
            }
        }

        *self.last_scan.write() = Some(now);
        let elapsed = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.metrics.record_scan(elapsed);
    }

    async fn check_slot(&self, slot: &Arc<TriggerSlot>, now: DateTime<Utc>) {
        let result = {
            let mut trigger = slot.trigger.lock().await;
            if slot.is_removed() {
                return;
            }
            let result = self.check_trigger(slot, &mut trigger, now).await;
            if result.changed && !slot.is_removed() {
                self.persist(slot.id, &trigger).await;
            }
            result
        };

        if slot.is_removed() {
            debug!(trigger_id = slot.id, "Trigger removed during check");
        } else if result.status == TriggerStatus::Expired && self.config.auto_removes(&slot.source) {
            info!(trigger_id = slot.id, source = %slot.source, "Removing expired trigger");
            if let Err(e) = self.remove_trigger(slot.id).await {
                warn!(trigger_id = slot.id, error = %e, "Failed to remove expired trigger");
            }
        } else if result.status == TriggerStatus::Ready {
            let due = self.due_time(result.next_hint, now, self.is_degraded(slot));
            self.reschedule(slot, due);
        } else {
            self.unschedule(slot);
        }

        self.apply_requests(result.requests, now).await;
    }

    /// Evaluate one trigger under its lock and apply the transition.
    async fn check_trigger(&self, slot: &TriggerSlot, trigger: &mut Trigger, now: DateTime<Utc>) -> CheckResult {
        self.metrics.record_check();
        let mut ctx = ActionContext::new(Some(slot.id), trigger.submit_user().to_string(), now);

        let changed = match trigger.evaluate(now).await {
            Ok(Verdict::Idle) => false,
            Ok(Verdict::Expire(actions)) => {
                self.metrics.record_expiration();
                if !actions.is_empty() {
                    run_actions(&actions, &mut ctx).await;
                }
                if let Err(e) = trigger.complete_expire(now) {
                    warn!(trigger_id = slot.id, error = %e, "Expire transition failed");
                }
                true
            }
            Ok(Verdict::Fire(actions)) => {
                // Checked again right before firing: removal may have been requested
                // while the conditions were evaluated.
                if slot.is_removed() {
                    return CheckResult {
                        changed: false,
                        status: trigger.status(),
                        next_hint: None,
                        requests: Vec::new(),
                    };
                }
                let outcome = run_actions(&actions, &mut ctx).await;
                self.metrics.record_fire(outcome.failures.len() as u64);
                info!(
                    trigger_id = slot.id,
                    source = %slot.source,
                    cycle_id = %outcome.cycle_id,
                    actions = outcome.actions_run,
                    failures = outcome.failures.len(),
                    "Trigger fired"
                );
                if let Err(e) = trigger.complete_fire(now, outcome) {
                    warn!(trigger_id = slot.id, error = %e, "Post-fire transition failed");
                }
                true
            }
            Err(e) => {
                self.metrics.record_evaluation_error();
                let failures = trigger.consecutive_failures();
                if failures == self.config.degraded_threshold {
                    error!(
                        trigger_id = slot.id,
                        source = %slot.source,
                        failures,
                        error = %e,
                        "Trigger degraded after repeated evaluation failures"
                    );
                } else {
                    warn!(trigger_id = slot.id, failures, error = %e, "Trigger evaluation failed");
                }
                false
            }
        };
        slot.failures.store(trigger.consecutive_failures(), Ordering::Relaxed);

        CheckResult {
            changed,
            status: trigger.status(),
            next_hint: trigger.next_check_time(),
            requests: ctx.take_requests(),
        }
    }

    /// Write a trigger's record. A failed write is retried on later cycles.
    pub(crate) async fn persist(&self, id: cadence_core::TriggerId, trigger: &Trigger) {
        let result = match trigger.to_record() {
            Ok(record) => self.loader.update_trigger(&record).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                self.collection.lock().dirty.remove(&id);
            }
            Err(e) => {
                self.metrics.record_persistence_failure();
                warn!(trigger_id = id, error = %e, "Failed to persist trigger, will retry");
                let mut collection = self.collection.lock();
                if collection.slots.contains_key(&id) {
                    collection.dirty.insert(id);
                }
            }
        }
    }

    async fn flush_dirty(&self) {
        let pending: Vec<Arc<TriggerSlot>> = {
            let collection = self.collection.lock();
            collection
                .dirty
                .iter()
                .filter_map(|id| collection.slots.get(id).cloned())
                .collect()
        };
        for slot in pending {
            let trigger = slot.trigger.lock().await;
            if slot.is_removed() {
                continue;
            }
            debug!(trigger_id = slot.id, "Retrying trigger persistence");
            self.persist(slot.id, &trigger).await;
        }
    }

    async fn apply_requests(&self, requests: Vec<TriggerRequest>, now: DateTime<Utc>) {
        for request in requests {
            let trigger = match request {
                TriggerRequest::Insert(trigger) => *trigger,
                TriggerRequest::InsertRecord(record) => {
                    match Trigger::from_record(&record, &self.registries, now) {
                        Ok(trigger) => trigger,
                        Err(e) => {
                            warn!(source = %record.source, error = %e, "Rejected trigger request");
                            continue;
                        }
                    }
                }
            };
            let source = trigger.source().to_string();
            match self.insert_trigger(trigger).await {
                Ok(id) => debug!(trigger_id = id, source = %source, "Inserted requested trigger"),
                Err(e) => warn!(source = %source, error = %e, "Failed to insert requested trigger"),
            }
        }
    }
}

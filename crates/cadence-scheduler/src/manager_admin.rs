//! Administrative operations on the trigger collection.

use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use cadence_core::{ExecutionId, Trigger, TriggerId, TriggerRecord, TriggerStatus};

use crate::error::{SchedulerError, SchedulerResult};
use crate::manager::{TriggerManager, TriggerSlot};

/// Point-in-time view of one trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSnapshot {
    pub trigger_id: TriggerId,
    pub source: String,
    pub status: TriggerStatus,
    pub next_check_time: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Failed action ids of the last firing cycle.
    pub last_failures: Vec<String>,
    pub record: TriggerRecord,
}

impl TriggerSnapshot {
    fn capture(id: TriggerId, trigger: &Trigger) -> SchedulerResult<Self> {
        Ok(Self {
            trigger_id: id,
            source: trigger.source().to_string(),
            status: trigger.status(),
            next_check_time: trigger.next_check_time(),
            consecutive_failures: trigger.consecutive_failures(),
            last_failures: trigger
                .last_outcome()
                .map(|o| o.failures.iter().map(|(id, _)| id.clone()).collect())
                .unwrap_or_default(),
            record: trigger.to_record()?,
        })
    }
}

impl TriggerManager {
    /// Persist and load a new trigger, returning its id.
    ///
    /// The trigger is stored first; if the write fails nothing is loaded.
    pub async fn insert_trigger(&self, mut trigger: Trigger) -> SchedulerResult<TriggerId> {
        let record = trigger.to_record()?;
        let id = self.loader.add_trigger(&record).await?;
        trigger.set_id(id);
        let source = trigger.source().to_string();
        self.add_slot(id, trigger, Utc::now());
        self.metrics.record_insert();
        self.wakeup.notify_one();
        debug!(trigger_id = id, source = %source, "Trigger inserted");
        Ok(id)
    }

    /// Replace a loaded trigger. Updating a trigger that is no longer loaded is a no-op.
    pub async fn update_trigger(&self, mut trigger: Trigger) -> SchedulerResult<()> {
        let id = trigger
            .id()
            .ok_or_else(|| SchedulerError::Internal("cannot update a trigger without an id".into()))?;
        let Some(slot) = self.slot(id) else {
            debug!(trigger_id = id, "Update of unknown trigger ignored");
            return Ok(());
        };
        let now = Utc::now();
        let _current = slot.trigger.lock().await;
        if slot.is_removed() {
            return Ok(());
        }
        trigger.set_status(trigger.status(), now);
        self.loader.update_trigger(&trigger.to_record()?).await?;
        // The new definition gets a fresh slot; a scan waiting on the old one skips it.
        if self.replace_slot(&slot, trigger, now) {
            self.wakeup.notify_one();
            info!(trigger_id = id, "Trigger updated");
        }
        Ok(())
    }

    /// Unload and delete a trigger. Removing an unknown trigger is a no-op.
    ///
    /// Returns only after any in-flight evaluation of the trigger has finished; the
    /// trigger does not fire after this call returns.
    pub async fn remove_trigger(&self, id: TriggerId) -> SchedulerResult<()> {
        let slot = {
            let mut collection = self.collection.lock();
            collection.queue.remove(id);
            collection.dirty.remove(&id);
            let slot = collection.slots.remove(&id);
            if let Some(slot) = &slot {
                slot.removed.store(true, Ordering::SeqCst);
            }
            slot
        };
        let Some(slot) = slot else {
            debug!(trigger_id = id, "Remove of unknown trigger ignored");
            return Ok(());
        };

        drop(slot.trigger.lock().await);
        self.loader.remove_trigger(id).await?;
        self.metrics.record_removal();
        info!(trigger_id = id, source = %slot.source, "Trigger removed");
        Ok(())
    }

    pub async fn pause_trigger(&self, id: TriggerId) -> SchedulerResult<()> {
        self.change_status(id, TriggerStatus::Paused).await
    }

    /// Return a paused or expired trigger to `READY` and check it on the next scan.
    pub async fn resume_trigger(&self, id: TriggerId) -> SchedulerResult<()> {
        self.change_status(id, TriggerStatus::Ready).await
    }

    pub async fn expire_trigger(&self, id: TriggerId) -> SchedulerResult<()> {
        self.change_status(id, TriggerStatus::Expired).await
    }

    async fn change_status(&self, id: TriggerId, status: TriggerStatus) -> SchedulerResult<()> {
        let slot = self.slot(id).ok_or(SchedulerError::TriggerNotFound(id))?;
        let now = Utc::now();
        {
            let mut trigger = slot.trigger.lock().await;
            if slot.is_removed() {
                return Err(SchedulerError::TriggerNotFound(id));
            }
            trigger.set_status(status, now);
            self.persist(id, &trigger).await;
        }
        if status == TriggerStatus::Ready {
            slot.failures.store(0, Ordering::Relaxed);
            self.reschedule(&slot, now);
        } else {
            self.unschedule(&slot);
        }
        Ok(())
    }

    pub async fn get_trigger(&self, id: TriggerId) -> SchedulerResult<TriggerSnapshot> {
        self.with_trigger(id, |trigger| TriggerSnapshot::capture(id, trigger))
            .await?
    }

    /// Every loaded trigger, ordered by id.
    pub async fn get_triggers(&self) -> SchedulerResult<Vec<TriggerSnapshot>> {
        self.snapshots(|_| true).await
    }

    pub async fn get_triggers_by_source(&self, source: &str) -> SchedulerResult<Vec<TriggerSnapshot>> {
        self.snapshots(|slot| slot.source == source).await
    }

    /// Triggers of `source` modified strictly after `since`.
    pub async fn get_trigger_updates(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> SchedulerResult<Vec<TriggerSnapshot>> {
        let snapshots = self.get_triggers_by_source(source).await?;
        Ok(snapshots
            .into_iter()
            .filter(|s| s.record.last_modify_time > since)
            .collect())
    }

    /// Ids of loaded triggers, optionally of one source, ordered by id.
    pub fn trigger_ids(&self, source: Option<&str>) -> Vec<TriggerId> {
        self.all_slots()
            .into_iter()
            .filter(|slot| source.is_none_or(|s| slot.source == s))
            .map(|slot| slot.id)
            .collect()
    }

    /// Run `f` against a loaded trigger.
    pub async fn with_trigger<R>(&self, id: TriggerId, f: impl FnOnce(&Trigger) -> R) -> SchedulerResult<R> {
        let slot = self.slot(id).ok_or(SchedulerError::TriggerNotFound(id))?;
        let trigger = slot.trigger.lock().await;
        if slot.is_removed() {
            return Err(SchedulerError::TriggerNotFound(id));
        }
        Ok(f(&trigger))
    }

    /// Check every trigger watching `execution_id` on the next scan.
    pub fn notify_execution_finished(&self, execution_id: ExecutionId) {
        let now = Utc::now();
        let woken = {
            let mut collection = self.collection.lock();
            let ids: Vec<TriggerId> = collection
                .slots
                .values()
                .filter(|s| s.monitored == Some(execution_id))
                .map(|s| s.id)
                .collect();
            for id in &ids {
                collection.queue.schedule(*id, now);
            }
            ids.len()
        };
        if woken > 0 {
            debug!(execution_id, triggers = woken, "Execution finished, checking watchers");
            self.wakeup.notify_one();
        }
    }

    /// Ids of triggers at or past the degraded threshold.
    pub fn degraded_triggers(&self) -> Vec<TriggerId> {
        self.all_slots()
            .into_iter()
            .filter(|slot| self.is_degraded(slot))
            .map(|slot| slot.id)
            .collect()
    }

    async fn snapshots(&self, keep: impl Fn(&TriggerSlot) -> bool) -> SchedulerResult<Vec<TriggerSnapshot>> {
        let mut snapshots = Vec::new();
        for slot in self.all_slots().into_iter().filter(|s| keep(s)) {
            let trigger = slot.trigger.lock().await;
            if slot.is_removed() {
                continue;
            }
            snapshots.push(TriggerSnapshot::capture(slot.id, &trigger)?);
        }
        Ok(snapshots)
    }
}

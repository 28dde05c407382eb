//! Trigger manager core: the trigger collection and the scan loop lifecycle.
//!
//! One background task owns evaluation. Administrative calls coordinate with it through
//! a single collection lock that is never held across an await. Each trigger has its own
//! async lock, held while it is evaluated and fired, so one trigger is never evaluated by
//! two scans at once and removal can wait out an in-flight firing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadence_core::{ExecutionId, Registries, Trigger, TriggerId, TriggerLoader};

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::metrics::{MetricsSnapshot, ScannerMetrics};
use crate::queue::ScanQueue;

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

/// What the scan loop is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerStage {
    NotStarted,
    Sleeping,
    Scanning,
    Stopped,
}

/// Scanner status report.
#[derive(Debug, Clone, Serialize)]
pub struct ScannerStats {
    pub stage: ScannerStage,
    pub last_scan_time: Option<DateTime<Utc>>,
    /// Planned sleep before the next scan, in milliseconds.
    pub idle_time_ms: u64,
    pub trigger_count: usize,
    pub sources: Vec<String>,
    pub degraded: usize,
    pub counters: MetricsSnapshot,
}

/// One loaded trigger.
pub(crate) struct TriggerSlot {
    pub(crate) id: TriggerId,
    pub(crate) source: String,
    pub(crate) monitored: Option<ExecutionId>,
    pub(crate) trigger: tokio::sync::Mutex<Trigger>,
    /// Set under the collection lock when the trigger is removed.
    pub(crate) removed: AtomicBool,
    pub(crate) failures: AtomicU32,
}

impl TriggerSlot {
    pub(crate) fn new(id: TriggerId, trigger: Trigger) -> Arc<Self> {
        Arc::new(Self {
            id,
            source: trigger.source().to_string(),
            monitored: trigger.monitored_execution(),
            failures: AtomicU32::new(trigger.consecutive_failures()),
            trigger: tokio::sync::Mutex::new(trigger),
            removed: AtomicBool::new(false),
        })
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

/// State guarded by the collection lock.
#[derive(Default)]
pub(crate) struct Collection {
    pub(crate) slots: HashMap<TriggerId, Arc<TriggerSlot>>,
    pub(crate) queue: ScanQueue,
    /// Triggers whose last persistence write failed.
    pub(crate) dirty: HashSet<TriggerId>,
}

impl Collection {
    /// Whether `slot` is still the loaded slot for its id.
    pub(crate) fn is_current(&self, slot: &Arc<TriggerSlot>) -> bool {
        self.slots.get(&slot.id).is_some_and(|current| Arc::ptr_eq(current, slot))
    }
}

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the loaded triggers and the loop that evaluates them.
pub struct TriggerManager {
    pub(crate) config: SchedulerConfig,
    pub(crate) loader: Arc<dyn TriggerLoader>,
    pub(crate) registries: Registries,
    pub(crate) collection: Mutex<Collection>,
    pub(crate) wakeup: Notify,
    /// Serializes scan cycles.
    pub(crate) scan_lock: tokio::sync::Mutex<()>,
    pub(crate) metrics: ScannerMetrics,
    pub(crate) stage: RwLock<ScannerStage>,
    pub(crate) last_scan: RwLock<Option<DateTime<Utc>>>,
    pub(crate) idle_time: RwLock<Duration>,
    handle: Mutex<Option<LoopHandle>>,
}

impl TriggerManager {
    pub fn new(config: SchedulerConfig, loader: Arc<dyn TriggerLoader>, registries: Registries) -> Self {
        Self {
            config,
            loader,
            registries,
            collection: Mutex::new(Collection::default()),
            wakeup: Notify::new(),
            scan_lock: tokio::sync::Mutex::new(()),
            metrics: ScannerMetrics::new(),
            stage: RwLock::new(ScannerStage::NotStarted),
            last_scan: RwLock::new(None),
            idle_time: RwLock::new(Duration::ZERO),
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    /// Load and decode every persisted trigger.
    ///
    /// A record that cannot be decoded aborts the load, naming the trigger.
    pub async fn load(&self) -> SchedulerResult<usize> {
        let records = self.loader.load_triggers().await?;
        let now = Utc::now();
        let mut triggers = Vec::with_capacity(records.len());
        for record in &records {
            let trigger = Trigger::from_record(record, &self.registries, now).map_err(|source| {
                SchedulerError::Decode {
                    trigger_id: record.trigger_id,
                    source,
                }
            })?;
            let id = trigger.id().ok_or_else(|| {
                SchedulerError::Internal("persisted trigger has no id".to_string())
            })?;
            triggers.push((id, trigger));
        }

        let count = triggers.len();
        for (id, trigger) in triggers {
            self.add_slot(id, trigger, now);
        }
        info!(count, "Loaded triggers");
        self.wakeup.notify_one();
        Ok(count)
    }

    /// Start the scan loop in a background task.
    pub fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let this = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            this.run(token).await;
        });
        *handle = Some(LoopHandle { cancel, task });
        self.metrics.mark_start();
        info!(
            scan_interval_secs = self.config.scan_interval_secs,
            "Trigger manager started"
        );
        Ok(())
    }

    /// Stop the scan loop and wait for it to exit.
    ///
    /// A scan in progress completes first, so no trigger is left half-persisted.
    pub async fn shutdown(&self) -> SchedulerResult<()> {
        let handle = self.handle.lock().take().ok_or(SchedulerError::NotRunning)?;
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            warn!(error = %e, "Scan loop task ended abnormally");
        }
        *self.stage.write() = ScannerStage::Stopped;
        info!("Trigger manager stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            let wait = self.time_until_next_scan(Utc::now());
            *self.idle_time.write() = wait;
            *self.stage.write() = ScannerStage::Sleeping;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wakeup.notified() => debug!("Scan loop woken"),
                _ = tokio::time::sleep(wait) => {}
            }

            *self.stage.write() = ScannerStage::Scanning;
            // A started cycle always runs to completion.
            self.scan(Utc::now()).await;
            if cancel.is_cancelled() {
                break;
            }
        }
        debug!("Scan loop exited");
    }

    /// Sleep until the earliest due trigger, capped by the scan interval.
    fn time_until_next_scan(&self, now: DateTime<Utc>) -> Duration {
        let ceiling = self.config.scan_interval();
        let mut collection = self.collection.lock();
        if !collection.dirty.is_empty() {
            return ceiling.min(self.config.poll_interval());
        }
        match collection.queue.peek() {
            Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO).min(ceiling),
            None => ceiling,
        }
    }

    /// Add a decoded trigger to the collection and queue it.
    ///
    /// A new trigger is first checked at its time hint, or on the next scan without one.
    pub(crate) fn add_slot(&self, id: TriggerId, trigger: Trigger, now: DateTime<Utc>) -> Arc<TriggerSlot> {
        let ready = trigger.status() == cadence_core::TriggerStatus::Ready;
        let due = first_due(&trigger, now);
        let slot = TriggerSlot::new(id, trigger);

        let mut collection = self.collection.lock();
        if let Some(old) = collection.slots.insert(id, slot.clone()) {
            old.removed.store(true, Ordering::SeqCst);
        }
        if ready {
            collection.queue.schedule(id, due);
        } else {
            collection.queue.remove(id);
        }
        slot
    }

    /// Swap `old` for a slot holding `trigger`, unless `old` was removed meanwhile.
    pub(crate) fn replace_slot(&self, old: &Arc<TriggerSlot>, trigger: Trigger, now: DateTime<Utc>) -> bool {
        let ready = trigger.status() == cadence_core::TriggerStatus::Ready;
        let due = first_due(&trigger, now);
        let slot = TriggerSlot::new(old.id, trigger);

        let mut collection = self.collection.lock();
        if !collection.is_current(old) {
            return false;
        }
        old.removed.store(true, Ordering::SeqCst);
        collection.slots.insert(old.id, slot);
        if ready {
            collection.queue.schedule(old.id, due);
        } else {
            collection.queue.remove(old.id);
        }
        true
    }

    pub(crate) fn slot(&self, id: TriggerId) -> Option<Arc<TriggerSlot>> {
        self.collection.lock().slots.get(&id).cloned()
    }

    pub(crate) fn all_slots(&self) -> Vec<Arc<TriggerSlot>> {
        let mut slots: Vec<_> = self.collection.lock().slots.values().cloned().collect();
        slots.sort_by_key(|s| s.id);
        slots
    }

    /// When a trigger should next be checked.
    ///
    /// Time hints in the future are honored; triggers without one are polled.
    pub(crate) fn due_time(
        &self,
        hint: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        degraded: bool,
    ) -> DateTime<Utc> {
        let after = |d: Duration| {
            chrono::Duration::from_std(d)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        };
        if degraded {
            return after(self.config.degraded_backoff());
        }
        match hint {
            Some(at) if at > now => at,
            _ => after(self.config.poll_interval()),
        }
    }

    /// Queue `slot` for checking at `at` and wake the loop.
    ///
    /// Does nothing once `slot` has been removed or replaced.
    pub(crate) fn reschedule(&self, slot: &Arc<TriggerSlot>, at: DateTime<Utc>) {
        {
            let mut collection = self.collection.lock();
            if !collection.is_current(slot) {
                return;
            }
            collection.queue.schedule(slot.id, at);
        }
        self.wakeup.notify_one();
    }

    pub(crate) fn unschedule(&self, slot: &Arc<TriggerSlot>) {
        let mut collection = self.collection.lock();
        if collection.is_current(slot) {
            collection.queue.remove(slot.id);
        }
    }

    /// Scanner status report.
    pub fn stats(&self) -> ScannerStats {
        let (trigger_count, sources, degraded) = {
            let collection = self.collection.lock();
            let mut sources: Vec<String> = collection
                .slots
                .values()
                .map(|s| s.source.clone())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            sources.sort();
            let degraded = collection
                .slots
                .values()
                .filter(|s| self.is_degraded(s))
                .count();
            (collection.slots.len(), sources, degraded)
        };
        ScannerStats {
            stage: *self.stage.read(),
            last_scan_time: *self.last_scan.read(),
            idle_time_ms: u64::try_from(self.idle_time.read().as_millis()).unwrap_or(u64::MAX),
            trigger_count,
            sources,
            degraded,
            counters: self.metrics.snapshot(),
        }
    }

    pub(crate) fn is_degraded(&self, slot: &TriggerSlot) -> bool {
        let threshold = self.config.degraded_threshold;
        threshold > 0 && slot.failures.load(Ordering::Relaxed) >= threshold
    }
}

fn first_due(trigger: &Trigger, now: DateTime<Utc>) -> DateTime<Utc> {
    trigger.next_check_time().map_or(now, |at| at.max(now))
}

//! Scanner metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scanner counters.
#[derive(Debug, Default)]
pub struct ScannerMetrics {
    /// Completed scan cycles.
    pub scans: AtomicU64,

    /// Trigger evaluations.
    pub triggers_checked: AtomicU64,

    /// Firing cycles.
    pub fires: AtomicU64,

    /// Expire transitions, including rearms.
    pub expirations: AtomicU64,

    /// Actions that returned an error.
    pub action_failures: AtomicU64,

    /// Trigger evaluations that returned an error.
    pub evaluation_errors: AtomicU64,

    /// Persistence writes that failed and were queued for retry.
    pub persistence_failures: AtomicU64,

    /// Triggers inserted.
    pub inserts: AtomicU64,

    /// Triggers removed.
    pub removals: AtomicU64,

    /// Time spent scanning (microseconds).
    pub scan_time_us: AtomicU64,

    start_time: parking_lot::RwLock<Option<Instant>>,
}

impl ScannerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of the scan loop.
    pub fn mark_start(&self) {
        *self.start_time.write() = Some(Instant::now());
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .read()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn record_scan(&self, duration_us: u64) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.scan_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn record_check(&self) {
        self.triggers_checked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fire(&self, failed_actions: u64) {
        self.fires.fetch_add(1, Ordering::Relaxed);
        self.action_failures.fetch_add(failed_actions, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evaluation_error(&self) {
        self.evaluation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of the metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            uptime_secs: self.uptime_secs(),
            scans: self.scans.load(Ordering::Relaxed),
            triggers_checked: self.triggers_checked.load(Ordering::Relaxed),
            fires: self.fires.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
            evaluation_errors: self.evaluation_errors.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            scan_time_us: self.scan_time_us.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub scans: u64,
    pub triggers_checked: u64,
    pub fires: u64,
    pub expirations: u64,
    pub action_failures: u64,
    pub evaluation_errors: u64,
    pub persistence_failures: u64,
    pub inserts: u64,
    pub removals: u64,
    pub scan_time_us: u64,
}

impl MetricsSnapshot {
    /// Average scan duration in milliseconds.
    pub fn avg_scan_time_ms(&self) -> f64 {
        if self.scans == 0 {
            return 0.0;
        }
        (self.scan_time_us as f64 / self.scans as f64) / 1000.0
    }

    /// Share of evaluations that failed.
    pub fn error_rate(&self) -> f64 {
        if self.triggers_checked == 0 {
            return 0.0;
        }
        self.evaluation_errors as f64 / self.triggers_checked as f64
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

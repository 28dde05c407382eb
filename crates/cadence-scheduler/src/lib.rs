//! # Cadence Scheduler
//!
//! The scanning runner that evaluates triggers over time, plus flow schedules built on it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       TriggerManager                          │
//! │  admin API ──► collection lock ──► slots + ScanQueue (heap)   │
//! │                                         │                     │
//! │  scan loop ── sleep(min(next due, scan interval)) / wakeup    │
//! │      └─► per-trigger lock: evaluate ► fire ► persist ► requeue│
//! └──────────────────────────────────────────────────────────────┘
//!           ▲                                   │
//!    ScheduleManager                      TriggerLoader
//! ```
//!
//! ## Key Components
//!
//! - [`TriggerManager`]: owns loaded triggers and the scan loop
//! - [`ScanQueue`]: triggers keyed by next-check time
//! - [`ScheduleManager`]: flow schedules stored as time triggers
//! - [`ScannerMetrics`]: scan, fire and failure counters
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cadence_core::{MemoryTriggerLoader, Registries};
//! use cadence_scheduler::{SchedulerConfig, TriggerManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = Arc::new(TriggerManager::new(
//!         SchedulerConfig::default(),
//!         Arc::new(MemoryTriggerLoader::new()),
//!         Registries::new(),
//!     ));
//!     manager.load().await?;
//!     manager.start()?;
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod manager;
mod manager_admin;
mod manager_scan;
pub mod metrics;
pub mod queue;
pub mod schedule;

// Re-exports
pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use manager::{ScannerStage, ScannerStats, TriggerManager};
pub use manager_admin::TriggerSnapshot;
pub use metrics::{MetricsSnapshot, ScannerMetrics};
pub use queue::ScanQueue;
pub use schedule::{Schedule, ScheduleManager, SCHEDULE_TRIGGER_SOURCE};
// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;

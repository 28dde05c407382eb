//! Configuration for the trigger manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Trigger manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Longest the scan loop sleeps without re-polling, in seconds.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Re-check delay for triggers without a future time hint, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Consecutive evaluation failures after which a trigger is degraded (0 = never).
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,

    /// Re-check delay for degraded triggers, in seconds.
    #[serde(default = "default_degraded_backoff_secs")]
    pub degraded_backoff_secs: u64,

    /// Sources whose triggers are removed once they expire.
    #[serde(default = "default_auto_remove_expired_sources")]
    pub auto_remove_expired_sources: Vec<String>,
}

fn default_scan_interval_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_degraded_threshold() -> u32 {
    3
}

fn default_degraded_backoff_secs() -> u64 {
    300
}

fn default_auto_remove_expired_sources() -> Vec<String> {
    vec![cadence_core::sla::SLA_TRIGGER_SOURCE.to_string()]
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            degraded_threshold: default_degraded_threshold(),
            degraded_backoff_secs: default_degraded_backoff_secs(),
            auto_remove_expired_sources: default_auto_remove_expired_sources(),
        }
    }
}

impl SchedulerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn degraded_backoff(&self) -> Duration {
        Duration::from_secs(self.degraded_backoff_secs)
    }

    /// Whether expired triggers of `source` are removed automatically.
    pub fn auto_removes(&self, source: &str) -> bool {
        self.auto_remove_expired_sources.iter().any(|s| s == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.scan_interval(), Duration::from_secs(60));
        assert_eq!(config.degraded_threshold, 3);
        assert!(config.auto_removes("sla"));
        assert!(!config.auto_removes("SimpleTimeTrigger"));
    }

    #[test]
    fn test_partial_deserialize() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"poll_interval_secs": 5, "auto_remove_expired_sources": []}"#)
                .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.scan_interval_secs, 60);
        assert!(!config.auto_removes("sla"));
    }
}

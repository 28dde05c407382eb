//! Configuration schema definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Trigger scanning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Longest idle wait between scans, in seconds.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Re-check delay for triggers without a time hint, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,

    #[serde(default = "default_degraded_backoff_secs")]
    pub degraded_backoff_secs: u64,

    #[serde(default = "default_auto_remove_expired_sources")]
    pub auto_remove_expired_sources: Vec<String>,
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
    vec!["sla".to_string()]
}

/// Trigger store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Keep triggers in memory only.
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            in_memory: false,
        }
    }
}

impl StoreConfig {
    /// Database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).into_owned())
    }
}

fn default_store_path() -> String {
    "~/.cadence/cadence.db".to_string()
}

/// Flow execution backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_executor_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User that schedules are submitted as when none is given.
    #[serde(default = "default_submit_user")]
    pub submit_user: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: default_executor_url(),
            timeout_secs: default_timeout_secs(),
            submit_user: default_submit_user(),
        }
    }
}

fn default_executor_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_submit_user() -> String {
    "cadence".to_string()
}

/// How notifications leave the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Write messages to the log.
    #[default]
    Log,
    /// POST messages to a webhook.
    Webhook,
}

/// Notification transport configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_from")]
    pub from: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            webhook_url: None,
            from: default_from(),
        }
    }
}

fn default_from() -> String {
    "cadence@localhost".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of text.
    #[serde(default)]
    pub json: bool,

    /// Directory for daily log files.
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            dir: None,
        }
    }
}

impl LoggingConfig {
    /// Log directory, defaulting to `~/.cadence/logs`.
    pub fn resolved_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".cadence")
                .join("logs"),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

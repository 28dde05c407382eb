//! Configuration validation.

use crate::schema::{Config, NotifierKind};

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_scheduler(config, &mut result);
        Self::validate_executor(config, &mut result);
        Self::validate_notifier(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;
        if scheduler.scan_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "scheduler.scan_interval_secs",
                "scan_interval_secs must be greater than 0",
            ));
        }
        if scheduler.scan_interval_secs > 3600 {
            result.add_warning(ValidationWarning::new(
                "scheduler.scan_interval_secs",
                "scan interval above an hour delays recovery from clock changes",
            ));
        }
        if scheduler.poll_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "scheduler.poll_interval_secs",
                "poll_interval_secs must be greater than 0",
            ));
        }
        if scheduler.degraded_backoff_secs == 0 {
            result.add_error(ValidationError::new(
                "scheduler.degraded_backoff_secs",
                "degraded_backoff_secs must be greater than 0",
            ));
        }
        if scheduler.degraded_threshold == 0 {
            result.add_warning(ValidationWarning::new(
                "scheduler.degraded_threshold",
                "degraded_threshold is 0, failing triggers are never backed off",
            ));
        }
    }

    fn validate_executor(config: &Config, result: &mut ValidationResult) {
        let executor = &config.executor;
        if let Err(message) = check_http_url(&executor.base_url) {
            result.add_error(ValidationError::new("executor.base_url", message));
        }
        if executor.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "executor.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }
        if executor.submit_user.is_empty() {
            result.add_error(ValidationError::new(
                "executor.submit_user",
                "submit_user cannot be empty",
            ));
        }
    }

    fn validate_notifier(config: &Config, result: &mut ValidationResult) {
        let notifier = &config.notifier;
        match (notifier.kind, &notifier.webhook_url) {
            (NotifierKind::Webhook, None) => {
                result.add_error(ValidationError::new(
                    "notifier.webhook_url",
                    "webhook notifier requires webhook_url",
                ));
            }
            (NotifierKind::Webhook, Some(url)) => {
                if let Err(message) = check_http_url(url) {
                    result.add_error(ValidationError::new("notifier.webhook_url", message));
                }
            }
            (NotifierKind::Log, Some(_)) => {
                result.add_warning(ValidationWarning::new(
                    "notifier.webhook_url",
                    "webhook_url is ignored by the log notifier",
                ));
            }
            (NotifierKind::Log, None) => {}
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if config.logging.level.trim().is_empty() {
            result.add_error(ValidationError::new("logging.level", "level cannot be empty"));
        }
    }
}

fn check_http_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("invalid URL '{raw}': {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(format!("URL scheme must be http or https, got '{scheme}'")),
    }
}

//! Engine assembly: store, collaborators, type registries and managers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use cadence_adapters::{HttpFlowExecutor, LogNotifier, WebhookNotifier};
use cadence_config::{Config, NotifierKind};
use cadence_core::{
    register_builtin_types, Collaborators, MemoryTriggerLoader, MetricStore, Notifier, Registries,
    TriggerLoader,
};
use cadence_scheduler::{ScheduleManager, SchedulerConfig, TriggerManager};
use cadence_store::SqliteTriggerLoader;

/// A loaded, not yet started engine.
pub(crate) struct Engine {
    pub triggers: Arc<TriggerManager>,
    pub schedules: ScheduleManager,
}

/// Runner configuration from the file config.
pub(crate) fn scheduler_config(config: &cadence_config::SchedulerConfig) -> SchedulerConfig {
    SchedulerConfig {
        scan_interval_secs: config.scan_interval_secs,
        poll_interval_secs: config.poll_interval_secs,
        degraded_threshold: config.degraded_threshold,
        degraded_backoff_secs: config.degraded_backoff_secs,
        auto_remove_expired_sources: config.auto_remove_expired_sources.clone(),
    }
}

async fn open_store(config: &Config, in_memory: bool) -> Result<Arc<dyn TriggerLoader>> {
    if in_memory || config.store.in_memory {
        info!("Using in-memory trigger store");
        return Ok(Arc::new(MemoryTriggerLoader::new()));
    }
    let path = config.store.resolved_path();
    let store = SqliteTriggerLoader::open(&path)
        .await
        .with_context(|| format!("failed to open trigger store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_collaborators(config: &Config) -> Result<Collaborators> {
    let executor = HttpFlowExecutor::with_timeout(
        config.executor.base_url.clone(),
        Duration::from_secs(config.executor.timeout_secs),
    )
    .context("failed to build flow executor client")?;

    let notifier: Arc<dyn Notifier> = match config.notifier.kind {
        NotifierKind::Log => Arc::new(LogNotifier),
        NotifierKind::Webhook => {
            let url = config
                .notifier
                .webhook_url
                .clone()
                .context("notifier.webhook_url is required for the webhook notifier")?;
            Arc::new(WebhookNotifier::new(url, config.notifier.from.clone()))
        }
    };

    Ok(Collaborators {
        flow_executor: Arc::new(executor),
        notifier,
        metrics: Arc::new(MetricStore::new()),
    })
}

/// Open the store, register every built-in type and load persisted triggers.
pub(crate) async fn build_engine(config: &Config, in_memory: bool) -> Result<Engine> {
    let loader = open_store(config, in_memory).await?;
    let collaborators = build_collaborators(config)?;

    let registries = Registries::new();
    register_builtin_types(&registries, &collaborators);

    let triggers = Arc::new(TriggerManager::new(
        scheduler_config(&config.scheduler),
        loader,
        registries,
    ));
    let loaded = triggers.load().await.context("failed to load stored triggers")?;
    info!(loaded, executor = %config.executor.base_url, "Engine assembled");

    let schedules = ScheduleManager::new(triggers.clone(), collaborators);
    Ok(Engine { triggers, schedules })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_in_memory_engine() {
        let engine = build_engine(&Config::default(), true).await.unwrap();
        assert_eq!(engine.triggers.stats().trigger_count, 0);
        assert!(engine.schedules.get_schedules().await.unwrap().is_empty());
    }

    #[test]
    fn test_scheduler_config_mapping() {
        let mut config = cadence_config::SchedulerConfig::default();
        config.poll_interval_secs = 5;
        config.auto_remove_expired_sources.push("adhoc".into());

        let mapped = scheduler_config(&config);
        assert_eq!(mapped.poll_interval_secs, 5);
        assert!(mapped.auto_removes("adhoc"));
        assert!(mapped.auto_removes("sla"));
    }

    #[test]
    fn test_webhook_without_url_fails() {
        let mut config = Config::default();
        config.notifier.kind = NotifierKind::Webhook;
        assert!(build_collaborators(&config).is_err());
    }
}

    use super::*;
    use std::any::Any;
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use serde_json::{json, Value};

    use cadence_core::checker::{ConstantChecker, ThresholdChecker};
    use cadence_core::testing::FakeCollaborators;
    use cadence_core::trigger::MONITORED_EXECUTION_KEY;
    use cadence_core::{
        register_builtin_types, ActionContext, CheckerValue, Condition, ConditionChecker,
        MemoryTriggerLoader, TimeChecker, TriggerAction, TriggerError, TriggerRecord, TriggerRequest,
        TriggerResult, TriggerStatus,
    };

    /// Counts runs and optionally queues a follow-up trigger.
    #[derive(Debug)]
    struct CountingAction {
        runs: Arc<AtomicU32>,
        spawn: bool,
    }

    #[async_trait]
    impl TriggerAction for CountingAction {
        fn id(&self) -> &str {
            "count"
        }

        fn type_tag(&self) -> &str {
            "Counting"
        }

        async fn do_action(&self, ctx: &mut ActionContext) -> TriggerResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.spawn {
                let child = Trigger::builder("child", "test", never(), never()).build(ctx.now());
                ctx.request(TriggerRequest::Insert(Box::new(child)));
            }
            Ok(())
        }

        fn to_record(&self) -> TriggerResult<Value> {
            Ok(json!({"type": "Counting", "id": "count"}))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Always fails to evaluate.
    #[derive(Debug)]
    struct BrokenChecker;

    #[async_trait]
    impl ConditionChecker for BrokenChecker {
        fn id(&self) -> &str {
            "broken"
        }

        fn type_tag(&self) -> &str {
            "Broken"
        }

        async fn eval(&mut self, _now: DateTime<Utc>) -> TriggerResult<CheckerValue> {
            Err(TriggerError::FlowBackend("unreachable".into()))
        }

        fn reset(&mut self, _now: DateTime<Utc>) -> TriggerResult<()> {
            Ok(())
        }

        fn next_check_time(&self) -> Option<DateTime<Utc>> {
            None
        }

        fn to_record(&self) -> TriggerResult<Value> {
            Ok(json!({"type": "Broken", "id": "broken"}))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Memory loader whose writes can be made to fail.
    #[derive(Debug, Default)]
    struct FlakyLoader {
        inner: MemoryTriggerLoader,
        fail_adds: AtomicBool,
        fail_updates: AtomicBool,
    }

    #[async_trait]
    impl TriggerLoader for FlakyLoader {
        async fn add_trigger(&self, record: &TriggerRecord) -> TriggerResult<TriggerId> {
            if self.fail_adds.load(Ordering::SeqCst) {
                return Err(TriggerError::Persistence("disk full".into()));
            }
            self.inner.add_trigger(record).await
        }

        async fn update_trigger(&self, record: &TriggerRecord) -> TriggerResult<()> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(TriggerError::Persistence("disk full".into()));
            }
            self.inner.update_trigger(record).await
        }

        async fn remove_trigger(&self, id: TriggerId) -> TriggerResult<()> {
            self.inner.remove_trigger(id).await
        }

        async fn load_trigger(&self, id: TriggerId) -> TriggerResult<Option<TriggerRecord>> {
            self.inner.load_trigger(id).await
        }

        async fn load_triggers(&self) -> TriggerResult<Vec<TriggerRecord>> {
            self.inner.load_triggers().await
        }

        async fn load_updated_triggers(&self, since: DateTime<Utc>) -> TriggerResult<Vec<TriggerRecord>> {
            self.inner.load_updated_triggers(since).await
        }
    }

    fn always() -> Condition {
        Condition::new(vec![Box::new(ConstantChecker::new("on", true))], "on.eval()")
    }

    fn never() -> Condition {
        Condition::new(vec![Box::new(ConstantChecker::new("off", false))], "off.eval()")
    }

    fn immediate_config() -> SchedulerConfig {
        SchedulerConfig {
            poll_interval_secs: 0,
            ..SchedulerConfig::default()
        }
    }

    fn manager_with(config: SchedulerConfig, loader: Arc<dyn TriggerLoader>) -> TriggerManager {
        TriggerManager::new(config, loader, Registries::new())
    }

    fn counting(runs: &Arc<AtomicU32>) -> CountingAction {
        CountingAction {
            runs: runs.clone(),
            spawn: false,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_persists() {
        let loader = Arc::new(MemoryTriggerLoader::new());
        let manager = manager_with(immediate_config(), loader.clone());

        let trigger = Trigger::builder("test", "alice", never(), never()).build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();

        assert_eq!(loader.len(), 1);
        assert_eq!(manager.trigger_ids(None), vec![id]);
        let snapshot = manager.get_trigger(id).await.unwrap();
        assert_eq!(snapshot.record.trigger_id, Some(id));
        assert_eq!(snapshot.status, TriggerStatus::Ready);
    }

    #[tokio::test]
    async fn test_failed_insert_loads_nothing() {
        let loader = Arc::new(FlakyLoader::default());
        loader.fail_adds.store(true, Ordering::SeqCst);
        let manager = manager_with(immediate_config(), loader);

        let trigger = Trigger::builder("test", "alice", always(), never()).build(Utc::now());
        let result = manager.insert_trigger(trigger).await;

        assert!(matches!(result, Err(SchedulerError::Trigger(TriggerError::Persistence(_)))));
        assert!(manager.trigger_ids(None).is_empty());
    }

    #[tokio::test]
    async fn test_scan_fires_recurring_trigger_each_cycle() {
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        let runs = Arc::new(AtomicU32::new(0));
        let trigger = Trigger::builder("test", "alice", always(), never())
            .action(counting(&runs))
            .build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();

        manager.scan(Utc::now()).await;
        manager.scan(Utc::now() + ChronoDuration::seconds(1)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        let snapshot = manager.get_trigger(id).await.unwrap();
        assert_eq!(snapshot.status, TriggerStatus::Ready);
        assert!(snapshot.last_failures.is_empty());
        assert_eq!(manager.stats().counters.fires, 2);
    }

    #[tokio::test]
    async fn test_latched_threshold_fires_once() {
        let fakes = FakeCollaborators::new();
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        let runs = Arc::new(AtomicU32::new(0));
        let checker = ThresholdChecker::new("load", "queue.depth", 10.0, fakes.metrics.clone());
        let trigger = Trigger::builder(
            "alerts",
            "alice",
            Condition::new(vec![Box::new(checker)], "load.eval()"),
            never(),
        )
        .action(counting(&runs))
        .reset_on_trigger(false)
        .build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();

        fakes.metrics.set("queue.depth", 3.0);
        manager.scan(Utc::now()).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        fakes.metrics.set("queue.depth", 12.0);
        let now = Utc::now() + ChronoDuration::seconds(1);
        manager.scan(now).await;
        manager.scan(now + ChronoDuration::seconds(1)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let snapshot = manager.get_trigger(id).await.unwrap();
        assert_eq!(snapshot.status, TriggerStatus::Expired);
        assert!(!manager.collection.lock().queue.contains(id));
    }

    #[tokio::test]
    async fn test_expired_sla_trigger_is_removed() {
        let loader = Arc::new(MemoryTriggerLoader::new());
        let manager = manager_with(immediate_config(), loader.clone());
        let trigger = Trigger::builder("sla", "alice", never(), always())
            .reset_on_trigger(false)
            .build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();

        manager.scan(Utc::now()).await;

        assert!(manager.trigger_ids(None).is_empty());
        assert!(loader.is_empty());
        assert!(matches!(
            manager.get_trigger(id).await,
            Err(SchedulerError::TriggerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_trigger_of_other_source_is_kept() {
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        let trigger = Trigger::builder("test", "alice", never(), always()).build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();

        manager.scan(Utc::now()).await;

        let snapshot = manager.get_trigger(id).await.unwrap();
        assert_eq!(snapshot.status, TriggerStatus::Expired);
        assert_eq!(manager.stats().counters.expirations, 1);
    }

    #[tokio::test]
    async fn test_removed_trigger_does_not_fire() {
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        let runs = Arc::new(AtomicU32::new(0));
        let trigger = Trigger::builder("test", "alice", always(), never())
            .action(counting(&runs))
            .build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();

        manager.remove_trigger(id).await.unwrap();
        manager.remove_trigger(id).await.unwrap();
        manager.scan(Utc::now()).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(manager.stats().counters.removals, 1);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        let runs = Arc::new(AtomicU32::new(0));
        let trigger = Trigger::builder("test", "alice", always(), never())
            .action(counting(&runs))
            .build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();

        manager.pause_trigger(id).await.unwrap();
        manager.scan(Utc::now()).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(manager.get_trigger(id).await.unwrap().status, TriggerStatus::Paused);

        manager.resume_trigger(id).await.unwrap();
        manager.scan(Utc::now() + ChronoDuration::seconds(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_change_of_unknown_trigger() {
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        assert!(matches!(
            manager.expire_trigger(42).await,
            Err(SchedulerError::TriggerNotFound(42))
        ));
        assert!(manager.remove_trigger(42).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_persistence_is_retried() {
        let loader = Arc::new(FlakyLoader::default());
        let manager = manager_with(immediate_config(), loader.clone());
        let trigger = Trigger::builder("test", "alice", never(), always()).build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();

        loader.fail_updates.store(true, Ordering::SeqCst);
        manager.scan(Utc::now()).await;
        assert!(manager.collection.lock().dirty.contains(&id));
        assert_eq!(manager.stats().counters.persistence_failures, 1);
        let stored = loader.load_trigger(id).await.unwrap().unwrap();
        assert_eq!(stored.status, TriggerStatus::Ready);

        loader.fail_updates.store(false, Ordering::SeqCst);
        manager.scan(Utc::now()).await;
        assert!(manager.collection.lock().dirty.is_empty());
        let stored = loader.load_trigger(id).await.unwrap().unwrap();
        assert_eq!(stored.status, TriggerStatus::Expired);
    }

    #[tokio::test]
    async fn test_repeated_evaluation_failures_degrade_trigger() {
        let config = SchedulerConfig {
            degraded_threshold: 2,
            ..immediate_config()
        };
        let manager = manager_with(config, Arc::new(MemoryTriggerLoader::new()));
        let trigger = Trigger::builder(
            "test",
            "alice",
            Condition::new(vec![Box::new(BrokenChecker)], "broken.eval()"),
            never(),
        )
        .build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();

        let now = Utc::now();
        manager.scan(now).await;
        assert!(manager.degraded_triggers().is_empty());
        manager.scan(now + ChronoDuration::seconds(1)).await;

        assert_eq!(manager.degraded_triggers(), vec![id]);
        let due = manager.collection.lock().queue.due_time(id);
        assert_eq!(due, Some(now + ChronoDuration::seconds(1) + ChronoDuration::seconds(300)));
        assert_eq!(manager.stats().degraded, 1);
        assert_eq!(manager.get_trigger(id).await.unwrap().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_execution_finished_wakes_watchers() {
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        let later = Utc::now() + ChronoDuration::hours(1);
        let timer = TimeChecker::builder("timer", later)
            .recurring(false)
            .build(Utc::now())
            .unwrap();
        let trigger = Trigger::builder(
            "sla",
            "alice",
            Condition::new(vec![Box::new(timer)], "timer.eval()"),
            never(),
        )
        .info(MONITORED_EXECUTION_KEY, "42")
        .build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();
        assert_eq!(manager.collection.lock().queue.due_time(id), Some(later));

        manager.notify_execution_finished(7);
        assert_eq!(manager.collection.lock().queue.due_time(id), Some(later));

        manager.notify_execution_finished(42);
        let due = manager.collection.lock().queue.due_time(id);
        assert!(due.is_some_and(|at| at <= Utc::now()));
    }

    #[tokio::test]
    async fn test_actions_can_insert_triggers() {
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        let runs = Arc::new(AtomicU32::new(0));
        let trigger = Trigger::builder("parent", "alice", always(), never())
            .action(CountingAction {
                runs: runs.clone(),
                spawn: true,
            })
            .reset_on_trigger(false)
            .build(Utc::now());
        manager.insert_trigger(trigger).await.unwrap();

        manager.scan(Utc::now()).await;

        assert_eq!(manager.trigger_ids(Some("child")).len(), 1);
        assert_eq!(manager.stats().sources, vec!["child".to_string(), "parent".to_string()]);
    }

    #[tokio::test]
    async fn test_load_decodes_persisted_triggers() {
        let fakes = FakeCollaborators::new();
        let registries = Registries::new();
        register_builtin_types(&registries, &fakes.collaborators());
        let loader = Arc::new(MemoryTriggerLoader::new());
        let record = Trigger::builder("test", "alice", always(), never())
            .build(Utc::now())
            .to_record()
            .unwrap();
        let id = loader.add_trigger(&record).await.unwrap();

        let manager = TriggerManager::new(immediate_config(), loader, registries);
        assert_eq!(manager.load().await.unwrap(), 1);
        assert_eq!(manager.trigger_ids(None), vec![id]);
    }

    #[tokio::test]
    async fn test_load_reports_undecodable_trigger() {
        let loader = Arc::new(MemoryTriggerLoader::new());
        let record = Trigger::builder("test", "alice", always(), never())
            .build(Utc::now())
            .to_record()
            .unwrap();
        let id = loader.add_trigger(&record).await.unwrap();

        let manager = manager_with(immediate_config(), loader);
        match manager.load().await {
            Err(SchedulerError::Decode { trigger_id, source }) => {
                assert_eq!(trigger_id, Some(id));
                assert!(matches!(source, TriggerError::UnknownType { .. }));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
        assert!(manager.trigger_ids(None).is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_definition() {
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        let runs = Arc::new(AtomicU32::new(0));
        let trigger = Trigger::builder("test", "alice", never(), never()).build(Utc::now());
        let id = manager.insert_trigger(trigger).await.unwrap();

        let mut replacement = Trigger::builder("test", "alice", always(), never())
            .action(counting(&runs))
            .description("now firing")
            .build(Utc::now());
        replacement.set_id(id);
        manager.update_trigger(replacement).await.unwrap();
        manager.scan(Utc::now()).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let description = manager
            .with_trigger(id, |t| t.description().map(str::to_string))
            .await
            .unwrap();
        assert_eq!(description.as_deref(), Some("now firing"));
    }

    #[tokio::test]
    async fn test_stale_slot_cannot_requeue_replacement() {
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        let id = manager
            .insert_trigger(Trigger::builder("test", "alice", never(), never()).build(Utc::now()))
            .await
            .unwrap();
        let stale = manager.slot(id).unwrap();

        let mut paused = Trigger::builder("test", "alice", never(), never()).build(Utc::now());
        paused.set_id(id);
        paused.set_status(TriggerStatus::Paused, Utc::now());
        manager.update_trigger(paused).await.unwrap();
        assert!(!manager.collection.lock().queue.contains(id));

        manager.reschedule(&stale, Utc::now());
        assert!(!manager.collection.lock().queue.contains(id));

        let mut ready = Trigger::builder("test", "alice", never(), never()).build(Utc::now());
        ready.set_id(id);
        manager.update_trigger(ready).await.unwrap();
        manager.unschedule(&stale);
        assert!(manager.collection.lock().queue.contains(id));
    }

    #[tokio::test]
    async fn test_trigger_queries_by_source_and_time() {
        let manager = manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new()));
        let before = Utc::now() - ChronoDuration::seconds(1);
        let a = manager
            .insert_trigger(Trigger::builder("a", "alice", never(), never()).build(Utc::now()))
            .await
            .unwrap();
        let b = manager
            .insert_trigger(Trigger::builder("b", "alice", never(), never()).build(Utc::now()))
            .await
            .unwrap();

        let all: Vec<_> = manager.get_triggers().await.unwrap().iter().map(|s| s.trigger_id).collect();
        assert_eq!(all, vec![a, b]);
        let only_b = manager.get_triggers_by_source("b").await.unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].trigger_id, b);
        assert_eq!(manager.get_trigger_updates("a", before).await.unwrap().len(), 1);
        assert!(manager
            .get_trigger_updates("a", Utc::now() + ChronoDuration::seconds(5))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let manager = Arc::new(manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new())));
        assert!(matches!(manager.shutdown().await, Err(SchedulerError::NotRunning)));

        manager.start().unwrap();
        assert!(manager.is_running());
        assert!(matches!(manager.start(), Err(SchedulerError::AlreadyRunning)));

        manager.shutdown().await.unwrap();
        assert!(!manager.is_running());
        assert_eq!(manager.stats().stage, ScannerStage::Stopped);
    }

    #[tokio::test]
    async fn test_running_loop_picks_up_new_trigger() {
        let manager = Arc::new(manager_with(immediate_config(), Arc::new(MemoryTriggerLoader::new())));
        manager.start().unwrap();

        let runs = Arc::new(AtomicU32::new(0));
        let trigger = Trigger::builder("test", "alice", always(), never())
            .action(counting(&runs))
            .reset_on_trigger(false)
            .build(Utc::now());
        manager.insert_trigger(trigger).await.unwrap();

        let fired = tokio::time::timeout(Duration::from_secs(5), async {
            while runs.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        manager.shutdown().await.unwrap();

        assert!(fired.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_due_time() {
        let manager = manager_with(SchedulerConfig::default(), Arc::new(MemoryTriggerLoader::new()));
        let now = Utc::now();
        let later = now + ChronoDuration::minutes(5);

        assert_eq!(manager.due_time(Some(later), now, false), later);
        assert_eq!(manager.due_time(Some(now), now, false), now + ChronoDuration::seconds(60));
        assert_eq!(manager.due_time(None, now, false), now + ChronoDuration::seconds(60));
        assert_eq!(manager.due_time(Some(later), now, true), now + ChronoDuration::seconds(300));
    }

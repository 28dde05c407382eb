    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use serde_json::Value;

    use crate::action::ExecuteFlowAction;
    use crate::builtin::register_builtin_types;
    use crate::checker::{CheckerValue, ConditionChecker, ConstantChecker, ThresholdChecker, TimeChecker};
    use crate::error::TriggerError;
    use crate::testing::FakeCollaborators;
    use crate::time::Period;

    /// Counts runs; optionally fails.
    #[derive(Debug)]
    struct CountingAction {
        id: String,
        runs: Arc<AtomicU32>,
        fail: bool,
    }

    impl CountingAction {
        fn new(id: &str, runs: &Arc<AtomicU32>) -> Self {
            Self {
                id: id.to_string(),
                runs: runs.clone(),
                fail: false,
            }
        }

        fn failing(id: &str, runs: &Arc<AtomicU32>) -> Self {
            Self {
                fail: true,
                ..Self::new(id, runs)
            }
        }
    }

    #[async_trait]
    impl TriggerAction for CountingAction {
        fn id(&self) -> &str {
            &self.id
        }

        fn type_tag(&self) -> &str {
            "Counting"
        }

        async fn do_action(&self, _ctx: &mut ActionContext) -> TriggerResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TriggerError::ActionFailed {
                    action: self.id.clone(),
                    message: "boom".into(),
                });
            }
            Ok(())
        }

        fn to_record(&self) -> TriggerResult<Value> {
            Ok(serde_json::json!({"type": "Counting", "id": self.id}))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Evaluates true but cannot be reset.
    #[derive(Debug)]
    struct StuckChecker;

    #[async_trait]
    impl ConditionChecker for StuckChecker {
        fn id(&self) -> &str {
            "stuck"
        }

        fn type_tag(&self) -> &str {
            "Stuck"
        }

        async fn eval(&mut self, _now: DateTime<Utc>) -> TriggerResult<CheckerValue> {
            Ok(true.into())
        }

        fn reset(&mut self, _now: DateTime<Utc>) -> TriggerResult<()> {
            Err(TriggerError::AdvanceLimitExceeded(3))
        }

        fn next_check_time(&self) -> Option<DateTime<Utc>> {
            None
        }

        fn to_record(&self) -> TriggerResult<Value> {
            Ok(serde_json::json!({"type": "Stuck", "id": "stuck"}))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, 0).unwrap()
    }

    fn timer(first: DateTime<Utc>, period: Option<&str>) -> Condition {
        let mut builder = TimeChecker::builder("timer", first).skip_past_occurrences(false);
        if let Some(p) = period {
            builder = builder.period(Period::parse(p).unwrap());
        }
        Condition::new(vec![Box::new(builder.build(first).unwrap())], "timer.eval()")
    }

    fn never() -> Condition {
        Condition::new(vec![Box::new(ConstantChecker::new("never", false))], "never.eval()")
    }

    fn always() -> Condition {
        Condition::new(vec![Box::new(ConstantChecker::new("always", true))], "always.eval()")
    }

    async fn tick(trigger: &mut Trigger, now: DateTime<Utc>) -> TickOutcome {
        let mut ctx = ActionContext::new(trigger.id(), trigger.submit_user().to_string(), now);
        trigger.tick(&mut ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_recurring_trigger_fires_each_period() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut trigger = Trigger::builder("test", "alice", timer(at(9, 0), Some("1h")), never())
            .action(CountingAction::new("count", &runs))
            .reset_on_trigger(true)
            .build(at(8, 0));

        assert_eq!(tick(&mut trigger, at(8, 59)).await, TickOutcome::Idle);
        assert!(matches!(tick(&mut trigger, at(9, 0)).await, TickOutcome::Fired(ref o) if o.is_success()));
        assert_eq!(trigger.next_check_time(), Some(at(10, 0)));
        assert_eq!(tick(&mut trigger, at(9, 30)).await, TickOutcome::Idle);
        assert!(matches!(tick(&mut trigger, at(10, 0)).await, TickOutcome::Fired(_)));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(trigger.status(), TriggerStatus::Ready);
        assert!(trigger.last_outcome().is_some());
    }

    #[tokio::test]
    async fn test_one_shot_trigger_expires_after_firing() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut trigger = Trigger::builder("test", "alice", timer(at(9, 0), None), never())
            .action(CountingAction::new("count", &runs))
            .reset_on_trigger(false)
            .build(at(8, 0));

        assert!(matches!(tick(&mut trigger, at(9, 0)).await, TickOutcome::Fired(_)));
        assert_eq!(trigger.status(), TriggerStatus::Expired);
        assert_eq!(tick(&mut trigger, at(9, 1)).await, TickOutcome::Idle);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_latched_threshold_fires_once() {
        let fakes = FakeCollaborators::new();
        let runs = Arc::new(AtomicU32::new(0));
        let condition = Condition::new(
            vec![Box::new(ThresholdChecker::new("load", "queue.depth", 100.0, fakes.metrics.clone()))],
            "load.eval()",
        );
        let mut trigger = Trigger::builder("metrics", "ops", condition, never())
            .action(CountingAction::new("page", &runs))
            .reset_on_trigger(false)
            .build(at(8, 0));

        assert_eq!(tick(&mut trigger, at(8, 1)).await, TickOutcome::Idle);
        fakes.metrics.set("queue.depth", 250.0);
        assert!(matches!(tick(&mut trigger, at(8, 2)).await, TickOutcome::Fired(_)));
        assert_eq!(tick(&mut trigger, at(8, 3)).await, TickOutcome::Idle);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(trigger.status(), TriggerStatus::Expired);
    }

    #[tokio::test]
    async fn test_expire_takes_precedence_over_fire() {
        let runs = Arc::new(AtomicU32::new(0));
        let cleanups = Arc::new(AtomicU32::new(0));
        let mut trigger = Trigger::builder("test", "alice", always(), always())
            .action(CountingAction::new("count", &runs))
            .expire_action(CountingAction::new("cleanup", &cleanups))
            .build(at(8, 0));

        assert_eq!(tick(&mut trigger, at(8, 0)).await, TickOutcome::Expired);
        assert_eq!(trigger.status(), TriggerStatus::Expired);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_on_expire_rearms_both_conditions() {
        let runs = Arc::new(AtomicU32::new(0));
        let expire = Condition::new(
            vec![Box::new(
                TimeChecker::builder("window", at(12, 0))
                    .period(Period::parse("1d").unwrap())
                    .skip_past_occurrences(false)
                    .build(at(8, 0))
                    .unwrap(),
            )],
            "window.eval()",
        );
        let mut trigger = Trigger::builder("test", "alice", timer(at(13, 0), Some("1h")), expire)
            .action(CountingAction::new("count", &runs))
            .reset_on_expire(true)
            .build(at(8, 0));

        assert_eq!(tick(&mut trigger, at(12, 0)).await, TickOutcome::Rearmed);
        assert_eq!(trigger.status(), TriggerStatus::Ready);
        assert_eq!(
            trigger.expire_condition().next_check_time(),
            Some(at(12, 0) + Duration::days(1))
        );
        assert_eq!(trigger.trigger_condition().next_check_time(), Some(at(14, 0)));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_action_does_not_stop_others() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut trigger = Trigger::builder("test", "alice", always(), never())
            .action(CountingAction::failing("first", &runs))
            .action(CountingAction::new("second", &runs))
            .reset_on_trigger(false)
            .build(at(8, 0));

        let TickOutcome::Fired(outcome) = tick(&mut trigger, at(8, 0)).await else {
            panic!("trigger should fire");
        };
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.actions_run, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "first");
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_paused_trigger_is_idle_until_resumed() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut trigger = Trigger::builder("test", "alice", always(), never())
            .action(CountingAction::new("count", &runs))
            .build(at(8, 0));
        trigger.set_status(TriggerStatus::Paused, at(8, 0));
        assert_eq!(tick(&mut trigger, at(8, 1)).await, TickOutcome::Idle);

        trigger.set_status(TriggerStatus::Ready, at(8, 2));
        assert_eq!(trigger.last_modify_time(), at(8, 2));
        assert!(matches!(tick(&mut trigger, at(8, 3)).await, TickOutcome::Fired(_)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_failure_pauses_trigger() {
        let condition = Condition::new(vec![Box::new(StuckChecker)], "stuck.eval()");
        let mut trigger = Trigger::builder("test", "alice", condition, never()).build(at(8, 0));
        let mut ctx = ActionContext::new(None, "alice", at(8, 0));
        let err = trigger.tick(&mut ctx).await.unwrap_err();
        assert!(matches!(err, TriggerError::AdvanceLimitExceeded(3)));
        assert_eq!(trigger.status(), TriggerStatus::Paused);
    }

    #[tokio::test]
    async fn test_evaluation_errors_mark_trigger_degraded() {
        let condition = Condition::new(vec![], "missing.eval()");
        let mut trigger = Trigger::builder("test", "alice", condition, never()).build(at(8, 0));
        for _ in 0..3 {
            assert!(trigger.evaluate(at(8, 0)).await.is_err());
        }
        assert_eq!(trigger.consecutive_failures(), 3);
        assert!(trigger.is_degraded(3));
        assert!(!trigger.is_degraded(0));

        trigger.trigger_condition_mut().set_expression("false");
        assert!(matches!(trigger.evaluate(at(8, 0)).await.unwrap(), Verdict::Idle));
        assert_eq!(trigger.consecutive_failures(), 0);
    }

    #[test]
    fn test_next_check_time_is_earliest_of_conditions() {
        let trigger = Trigger::builder("test", "alice", timer(at(9, 0), Some("1h")), timer(at(7, 0), None))
            .build(at(6, 0));
        assert_eq!(trigger.next_check_time(), Some(at(7, 0)));

        let trigger = Trigger::builder("test", "alice", timer(at(9, 0), None), never()).build(at(6, 0));
        assert_eq!(trigger.next_check_time(), Some(at(9, 0)));
    }

    #[test]
    fn test_monitored_execution() {
        let trigger = Trigger::builder("sla", "alice", never(), never())
            .info(MONITORED_EXECUTION_KEY, "42")
            .build(at(8, 0));
        assert_eq!(trigger.monitored_execution(), Some(42));

        let trigger = Trigger::builder("sla", "alice", never(), never()).build(at(8, 0));
        assert_eq!(trigger.monitored_execution(), None);
    }

    #[test]
    fn test_record_round_trip_through_registries() {
        let fakes = FakeCollaborators::new();
        let registries = Registries::new();
        register_builtin_types(&registries, &fakes.collaborators());

        let action = ExecuteFlowAction::new(
            "executeFlowAction",
            7,
            "etl",
            "nightly",
            "alice",
            fakes.executor.clone(),
            fakes.notifier.clone(),
        );
        let mut trigger = Trigger::builder("SimpleTimeTrigger", "alice", timer(at(9, 0), Some("1d")), never())
            .action(action)
            .description("nightly load")
            .build(at(8, 0));
        trigger.set_id(11);
        trigger.set_status(TriggerStatus::Paused, at(8, 30));

        let json = trigger.to_record().unwrap().to_json().unwrap();
        let record = TriggerRecord::from_json(&json).unwrap();
        let restored = Trigger::from_record(&record, &registries, at(8, 45)).unwrap();

        assert_eq!(restored.id(), Some(11));
        assert_eq!(restored.status(), TriggerStatus::Paused);
        assert_eq!(restored.description(), Some("nightly load"));
        assert_eq!(restored.last_modify_time(), at(8, 30));
        assert_eq!(restored.next_check_time(), Some(at(9, 0)));
        let action = restored.action_as::<ExecuteFlowAction>().unwrap();
        assert_eq!(action.flow_name(), "nightly");
        assert_eq!(action.project_id(), 7);
    }

    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::checker::{ConstantChecker, TimeChecker};
    use crate::error::TriggerError;
    use crate::time::Period;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    fn hourly(id: &str, first: DateTime<Utc>) -> Box<dyn ConditionChecker> {
        Box::new(
            TimeChecker::builder(id, first)
                .period(Period::parse("1h").unwrap())
                .skip_past_occurrences(false)
                .build(first)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_is_met_combines_checkers() {
        let mut condition = Condition::new(
            vec![hourly("timer", at(10)), Box::new(ConstantChecker::new("enabled", true))],
            "timer.eval() && enabled.eval()",
        );
        assert!(!condition.is_met(at(9)).await.unwrap());
        assert!(condition.is_met(at(10)).await.unwrap());

        condition.set_expression("timer.eval() && !enabled.eval()");
        assert!(!condition.is_met(at(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_parse_error_surfaces_on_evaluation() {
        let mut condition = Condition::new(vec![hourly("timer", at(10))], "timer.eval() &&");
        assert_eq!(condition.expression(), "timer.eval() &&");
        let err = condition.is_met(at(10)).await.unwrap_err();
        assert!(matches!(err, TriggerError::ExpressionParse { .. }));
    }

    #[test]
    fn test_next_check_time_uses_referenced_checkers() {
        let condition = Condition::new(
            vec![hourly("early", at(8)), hourly("late", at(12))],
            "late.eval()",
        );
        assert_eq!(condition.next_check_time(), Some(at(12)));

        let unparsable = Condition::new(
            vec![hourly("early", at(8)), hourly("late", at(12))],
            "late.eval(",
        );
        assert_eq!(unparsable.next_check_time(), Some(at(8)));
    }

    #[test]
    fn test_reset_checkers_advances_time() {
        let mut condition = Condition::new(vec![hourly("timer", at(10))], "timer.eval()");
        condition.reset_checkers(at(10)).unwrap();
        assert_eq!(condition.next_check_time(), Some(at(11)));

        let timer = condition.checker_as::<TimeChecker>("timer").unwrap();
        assert_eq!(timer.first_check_time(), at(10));
        assert!(condition.checker_as::<ConstantChecker>("timer").is_none());
    }

    #[test]
    fn test_record_rebuilds_through_registry() {
        let registry = CheckerRegistry::new("checker");
        registry.register(TimeChecker::TYPE, |value, now| {
            Ok(Box::new(TimeChecker::from_record(value, now)?))
        });
        registry.register(ConstantChecker::TYPE, |value, _now| {
            Ok(Box::new(ConstantChecker::from_record(value)?))
        });

        let original = Condition::new(
            vec![hourly("timer", at(10)), Box::new(ConstantChecker::new("never", false))],
            "timer.eval() || never.eval()",
        );
        let record = original.to_record().unwrap();
        assert_eq!(record.checkers.len(), 2);
        assert_eq!(record.checkers["timer"]["type"], "BasicTimeChecker");

        let rebuilt = Condition::from_record(&record, &registry, at(9)).unwrap();
        assert_eq!(rebuilt.expression(), "timer.eval() || never.eval()");
        assert_eq!(rebuilt.next_check_time(), Some(at(10)));
        assert_eq!(rebuilt.checkers().count(), 2);
    }

    #[test]
    fn test_record_with_unregistered_type_fails() {
        let registry = CheckerRegistry::new("checker");
        let record = Condition::new(vec![hourly("timer", at(10))], "timer.eval()")
            .to_record()
            .unwrap();
        let err = Condition::from_record(&record, &registry, at(10) + Duration::hours(1)).unwrap_err();
        assert!(matches!(err, TriggerError::UnknownType { .. }));
    }

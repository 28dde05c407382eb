    use super::*;
    use chrono::NaiveDate;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    const LA: Tz = chrono_tz::America::Los_Angeles;

    #[test]
    fn test_period_parse_and_display() {
        let p = Period::parse("2d").unwrap();
        assert_eq!(p.amount(), 2);
        assert_eq!(p.unit(), PeriodUnit::Days);
        assert_eq!(p.to_string(), "2d");
        assert_eq!(Period::parse("1M").unwrap().unit(), PeriodUnit::Months);
        assert_eq!(Period::parse("15m").unwrap().unit(), PeriodUnit::Minutes);
        assert_eq!("3w".parse::<Period>().unwrap().unit(), PeriodUnit::Weeks);
    }

    #[test]
    fn test_period_parse_invalid() {
        assert!(matches!(Period::parse("0d"), Err(TriggerError::InvalidPeriod(_))));
        assert!(matches!(Period::parse("d"), Err(TriggerError::InvalidPeriod(_))));
        assert!(matches!(Period::parse("5x"), Err(TriggerError::InvalidPeriod(_))));
        assert!(matches!(Period::parse("-1h"), Err(TriggerError::InvalidPeriod(_))));
        assert!(Period::parse("").is_err());
    }

    #[test]
    fn test_period_parse_optional() {
        assert_eq!(Period::parse_optional("n").unwrap(), None);
        assert_eq!(Period::parse_optional("null").unwrap(), None);
        assert_eq!(
            Period::parse_optional("1h").unwrap(),
            Some(Period::new(1, PeriodUnit::Hours).unwrap())
        );
    }

    #[test]
    fn test_period_serde() {
        let p = Period::parse("10s").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"10s\"");
        let back: Period = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_day_period_keeps_wall_clock_across_spring_forward() {
        // 2020-03-07 12:00 PST
        let start = utc(2020, 3, 7, 20, 0);
        let next = Period::parse("1d").unwrap().add_to(start, LA).unwrap();
        // 2020-03-08 12:00 PDT, only 23 hours later
        assert_eq!(next, utc(2020, 3, 8, 19, 0));
    }

    #[test]
    fn test_hour_period_is_exact_elapsed_time() {
        // 2020-03-08 01:30 PST
        let start = utc(2020, 3, 8, 9, 30);
        let next = Period::parse("1h").unwrap().add_to(start, LA).unwrap();
        assert_eq!(next, utc(2020, 3, 8, 10, 30));
    }

    #[test]
    fn test_month_period_clamps_day() {
        let start = utc(2021, 1, 31, 12, 0);
        let next = Period::parse("1M").unwrap().add_to(start, chrono_tz::UTC).unwrap();
        assert_eq!(next, utc(2021, 2, 28, 12, 0));
    }

    #[test]
    fn test_resolve_local_gap_moves_to_first_valid_instant() {
        let resolved = resolve_local(LA, naive(2020, 3, 8, 2, 30)).unwrap();
        // 03:00 PDT
        assert_eq!(resolved, utc(2020, 3, 8, 10, 0));
    }

    #[test]
    fn test_resolve_local_ambiguous_takes_earlier() {
        let resolved = resolve_local(LA, naive(2020, 11, 1, 1, 30)).unwrap();
        // 01:30 PDT, not 01:30 PST
        assert_eq!(resolved, utc(2020, 11, 1, 8, 30));
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("America/Los_Angeles").unwrap(), LA);
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(TriggerError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_cron_accepts_question_mark() {
        let cron = CronSpec::parse("0 30 10 8 3 ? 2020").unwrap();
        assert_eq!(cron.expression(), "0 30 10 8 3 ? 2020");
        let next = cron.next_after(utc(2020, 1, 1, 0, 0), chrono_tz::UTC).unwrap();
        assert_eq!(next, Some(utc(2020, 3, 8, 10, 30)));
    }

    #[test]
    fn test_cron_invalid() {
        assert!(matches!(
            CronSpec::parse("not a cron"),
            Err(TriggerError::InvalidCron { .. })
        ));
    }

    #[test]
    fn test_cron_in_spring_forward_gap() {
        let cron = CronSpec::parse("0 30 2 * * ?").unwrap();
        // 2020-03-07 02:30 PST
        let first = cron.next_after(utc(2020, 3, 7, 10, 30), LA).unwrap().unwrap();
        assert_eq!(first, utc(2020, 3, 8, 10, 0));
        let second = cron.next_after(first, LA).unwrap().unwrap();
        // 2020-03-09 02:30 PDT
        assert_eq!(second, utc(2020, 3, 9, 9, 30));
    }

    #[test]
    fn test_cron_in_fall_back_fires_once_per_day() {
        let cron = CronSpec::parse("0 0 1 * * ?").unwrap();
        // 2020-10-31 01:00 PDT
        let first = cron.next_after(utc(2020, 10, 31, 8, 0), LA).unwrap().unwrap();
        assert_eq!(first, utc(2020, 11, 1, 8, 0));
        let second = cron.next_after(first, LA).unwrap().unwrap();
        // 2020-11-02 01:00 PST, the repeated 01:00 is not fired again
        assert_eq!(second, utc(2020, 11, 2, 9, 0));
    }

    #[test]
    fn test_cron_exhausted() {
        let cron = CronSpec::parse("0 0 0 1 1 ? 2020").unwrap();
        assert_eq!(cron.next_after(utc(2021, 1, 1, 0, 0), chrono_tz::UTC).unwrap(), None);
    }

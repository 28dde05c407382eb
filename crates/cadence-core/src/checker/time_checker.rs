//! Time-based checker supporting fixed periods and cron expressions.

use std::any::Any;

use async_trait::async_trait;
use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::{CheckerValue, ConditionChecker};
use crate::error::{TriggerError, TriggerResult};
use crate::record;
use crate::time::{serde_tz, CronSpec, Period, MAX_ADVANCE_ITERATIONS};

#[cfg(test)]
#[path = "time_checker_tests.rs"]
mod tests;

/// True once the current instant reaches the next scheduled instant.
///
/// Recurrence is either a [`Period`] or a cron expression, never both. Without either
/// the checker fires once and stays true. A cron expression that runs out of occurrences
/// leaves the checker exhausted: it evaluates false and reports no next check time.
#[derive(Debug, Clone)]
pub struct TimeChecker {
    id: String,
    first_check_time: DateTime<Utc>,
    next_check_time: Option<DateTime<Utc>>,
    timezone: Tz,
    period: Option<Period>,
    cron: Option<CronSpec>,
    is_recurring: bool,
    skip_past_occurrences: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeCheckerRecord {
    id: String,
    #[serde(with = "ts_milliseconds")]
    first_check_time: DateTime<Utc>,
    #[serde(default, with = "ts_milliseconds_option")]
    next_check_time: Option<DateTime<Utc>>,
    #[serde(with = "serde_tz")]
    timezone: Tz,
    #[serde(default)]
    period: Option<Period>,
    #[serde(default)]
    cron_expression: Option<String>,
    is_recurring: bool,
    #[serde(rename = "skipPastChecks")]
    skip_past_occurrences: bool,
}

impl TimeChecker {
    pub const TYPE: &'static str = "BasicTimeChecker";

    pub fn builder(id: impl Into<String>, first_check_time: DateTime<Utc>) -> TimeCheckerBuilder {
        TimeCheckerBuilder {
            id: id.into(),
            first_check_time,
            timezone: chrono_tz::UTC,
            period: None,
            cron_expression: None,
            is_recurring: true,
            skip_past_occurrences: true,
        }
    }

    /// Rebuild from a persisted record. Skip-past checkers catch up to `now`.
    pub fn from_record(value: &serde_json::Value, now: DateTime<Utc>) -> TriggerResult<Self> {
        let r: TimeCheckerRecord = record::decode(Self::TYPE, value)?;
        let cron = r.cron_expression.as_deref().map(CronSpec::parse).transpose()?;
        check_exclusive(&r.id, r.period.as_ref(), cron.as_ref())?;
        let mut checker = Self {
            id: r.id,
            first_check_time: r.first_check_time,
            next_check_time: r.next_check_time,
            timezone: r.timezone,
            period: r.period,
            cron,
            is_recurring: r.is_recurring,
            skip_past_occurrences: r.skip_past_occurrences,
        };
        if checker.skip_past_occurrences {
            checker.catch_up(now)?;
        }
        Ok(checker)
    }

    pub fn first_check_time(&self) -> DateTime<Utc> {
        self.first_check_time
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn period(&self) -> Option<Period> {
        self.period
    }

    pub fn cron_expression(&self) -> Option<&str> {
        self.cron.as_ref().map(CronSpec::expression)
    }

    pub fn is_recurring(&self) -> bool {
        self.is_recurring
    }

    pub fn skip_past_occurrences(&self) -> bool {
        self.skip_past_occurrences
    }

    fn has_recurrence(&self) -> bool {
        self.period.is_some() || self.cron.is_some()
    }

    fn step(&self, from: DateTime<Utc>) -> TriggerResult<Option<DateTime<Utc>>> {
        match (&self.cron, self.period) {
            (Some(cron), _) => cron.next_after(from, self.timezone),
            (None, Some(period)) => period.add_to(from, self.timezone).map(Some),
            (None, None) => Ok(Some(from)),
        }
    }

    /// Advance while the next check is at or before `now`.
    fn catch_up(&mut self, now: DateTime<Utc>) -> TriggerResult<()> {
        if !self.has_recurrence() {
            return Ok(());
        }
        let mut increments = 0;
        while let Some(next) = self.next_check_time {
            if next > now {
                break;
            }
            if increments >= MAX_ADVANCE_ITERATIONS {
                return Err(TriggerError::AdvanceLimitExceeded(MAX_ADVANCE_ITERATIONS));
            }
            self.next_check_time = self.step(next)?;
            increments += 1;
        }
        Ok(())
    }
}

fn check_exclusive(id: &str, period: Option<&Period>, cron: Option<&CronSpec>) -> TriggerResult<()> {
    if period.is_some() && cron.is_some() {
        return Err(TriggerError::MalformedRecord(format!(
            "time checker {id} sets both a period and a cron expression"
        )));
    }
    Ok(())
}

#[async_trait]
impl ConditionChecker for TimeChecker {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn eval(&mut self, now: DateTime<Utc>) -> TriggerResult<CheckerValue> {
        Ok(self.next_check_time.is_some_and(|next| now >= next).into())
    }

    fn reset(&mut self, now: DateTime<Utc>) -> TriggerResult<()> {
        if !self.has_recurrence() {
            return Ok(());
        }
        if self.skip_past_occurrences {
            self.catch_up(now)
        } else {
            if let Some(next) = self.next_check_time {
                self.next_check_time = self.step(next)?;
            }
            Ok(())
        }
    }

    fn next_check_time(&self) -> Option<DateTime<Utc>> {
        self.next_check_time
    }

    fn to_record(&self) -> TriggerResult<serde_json::Value> {
        record::tagged(
            Self::TYPE,
            &TimeCheckerRecord {
                id: self.id.clone(),
                first_check_time: self.first_check_time,
                next_check_time: self.next_check_time,
                timezone: self.timezone,
                period: self.period,
                cron_expression: self.cron_expression().map(str::to_string),
                is_recurring: self.is_recurring,
                skip_past_occurrences: self.skip_past_occurrences,
            },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builder for [`TimeChecker`].
#[derive(Debug, Clone)]
pub struct TimeCheckerBuilder {
    id: String,
    first_check_time: DateTime<Utc>,
    timezone: Tz,
    period: Option<Period>,
    cron_expression: Option<String>,
    is_recurring: bool,
    skip_past_occurrences: bool,
}

impl TimeCheckerBuilder {
    pub fn timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn cron(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    pub fn recurring(mut self, is_recurring: bool) -> Self {
        self.is_recurring = is_recurring;
        self
    }

    pub fn skip_past_occurrences(mut self, skip: bool) -> Self {
        self.skip_past_occurrences = skip;
        self
    }

    /// Build the checker.
    ///
    /// A cron checker's first check is the first occurrence at or after the first-check
    /// instant. With skip-past enabled, occurrences at or before `now` are skipped.
    pub fn build(self, now: DateTime<Utc>) -> TriggerResult<TimeChecker> {
        let cron = self
            .cron_expression
            .as_deref()
            .map(CronSpec::parse)
            .transpose()?;
        check_exclusive(&self.id, self.period.as_ref(), cron.as_ref())?;
        let next_check_time = match &cron {
            Some(cron) => cron.next_after(self.first_check_time - Duration::milliseconds(1), self.timezone)?,
            None => Some(self.first_check_time),
        };
        let mut checker = TimeChecker {
            id: self.id,
            first_check_time: self.first_check_time,
            next_check_time,
            timezone: self.timezone,
            period: self.period,
            cron,
            is_recurring: self.is_recurring,
            skip_past_occurrences: self.skip_past_occurrences,
        };
        if checker.skip_past_occurrences {
            checker.catch_up(now)?;
        }
        Ok(checker)
    }
}

//! Calendar arithmetic: recurrence periods, cron evaluation and local-time resolution.
//!
//! All recurrence is computed on the wall clock of a configured timezone. Two rules
//! make local times total:
//!
//! - a wall-clock time that falls into a spring-forward gap resolves to the first valid
//!   instant after the gap (02:30 on a day that jumps from 02:00 to 03:00 becomes 03:00);
//! - a wall-clock time that occurs twice during a fall-back resolves to the earlier
//!   occurrence.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Days, Duration, LocalResult, Months, NaiveDateTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{TriggerError, TriggerResult};

#[cfg(test)]
#[path = "time_tests.rs"]
mod tests;

/// Maximum number of increments allowed when catching a schedule up to the present.
pub const MAX_ADVANCE_ITERATIONS: u32 = 100_000;

/// Longest spring-forward gap searched when resolving a skipped local time.
const GAP_SEARCH_MINUTES: i64 = 48 * 60;

/// Unit of a recurrence period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodUnit {
    Months,
    Weeks,
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl PeriodUnit {
    fn suffix(self) -> char {
        match self {
            Self::Months => 'M',
            Self::Weeks => 'w',
            Self::Days => 'd',
            Self::Hours => 'h',
            Self::Minutes => 'm',
            Self::Seconds => 's',
        }
    }

    fn from_suffix(c: char) -> Option<Self> {
        match c {
            'M' => Some(Self::Months),
            'w' => Some(Self::Weeks),
            'd' => Some(Self::Days),
            'h' => Some(Self::Hours),
            'm' => Some(Self::Minutes),
            's' => Some(Self::Seconds),
            _ => None,
        }
    }
}

/// A positive recurrence period such as `1d` or `30m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    amount: u32,
    unit: PeriodUnit,
}

impl Period {
    /// Create a period. The amount must be positive.
    pub fn new(amount: u32, unit: PeriodUnit) -> TriggerResult<Self> {
        if amount == 0 {
            return Err(TriggerError::InvalidPeriod(format!(
                "zero-length period 0{}",
                unit.suffix()
            )));
        }
        Ok(Self { amount, unit })
    }

    /// Parse the compact `<amount><unit>` form.
    pub fn parse(s: &str) -> TriggerResult<Self> {
        let s = s.trim();
        let mut chars = s.chars();
        let unit = chars
            .next_back()
            .and_then(PeriodUnit::from_suffix)
            .ok_or_else(|| TriggerError::InvalidPeriod(s.to_string()))?;
        let amount: u32 = chars
            .as_str()
            .parse()
            .map_err(|_| TriggerError::InvalidPeriod(s.to_string()))?;
        Self::new(amount, unit)
    }

    /// Parse a period that may be absent (`""`, `"n"` or `"null"`).
    pub fn parse_optional(s: &str) -> TriggerResult<Option<Self>> {
        match s.trim() {
            "" | "n" | "null" => Ok(None),
            other => Self::parse(other).map(Some),
        }
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn unit(&self) -> PeriodUnit {
        self.unit
    }

    /// Add this period to an instant.
    ///
    /// Months, weeks and days move the local calendar date and keep the wall-clock time;
    /// hours, minutes and seconds add exact elapsed time.
    pub fn add_to(&self, instant: DateTime<Utc>, tz: Tz) -> TriggerResult<DateTime<Utc>> {
        let amount = i64::from(self.amount);
        let local = instant.with_timezone(&tz).naive_local();
        let shifted = match self.unit {
            PeriodUnit::Seconds => return Ok(instant + Duration::seconds(amount)),
            PeriodUnit::Minutes => return Ok(instant + Duration::minutes(amount)),
            PeriodUnit::Hours => return Ok(instant + Duration::hours(amount)),
            PeriodUnit::Days => local.checked_add_days(Days::new(u64::from(self.amount))),
            PeriodUnit::Weeks => local.checked_add_days(Days::new(u64::from(self.amount) * 7)),
            PeriodUnit::Months => local.checked_add_months(Months::new(self.amount)),
        }
        .ok_or_else(|| TriggerError::InvalidPeriod(format!("{self} overflows from {local}")))?;
        resolve_local(tz, shifted)
    }

    /// Nominal length of the period, counting a month as 30 days.
    pub fn approximate_duration(&self) -> Duration {
        let amount = i64::from(self.amount);
        match self.unit {
            PeriodUnit::Months => Duration::days(30 * amount),
            PeriodUnit::Weeks => Duration::weeks(amount),
            PeriodUnit::Days => Duration::days(amount),
            PeriodUnit::Hours => Duration::hours(amount),
            PeriodUnit::Minutes => Duration::minutes(amount),
            PeriodUnit::Seconds => Duration::seconds(amount),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for Period {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse an IANA timezone id.
pub fn parse_timezone(id: &str) -> TriggerResult<Tz> {
    id.trim()
        .parse::<Tz>()
        .map_err(|_| TriggerError::InvalidTimezone(id.to_string()))
}

/// Map a wall-clock time in `tz` to an instant.
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> TriggerResult<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => first_instant_after_gap(tz, local),
    }
}

fn first_instant_after_gap(tz: Tz, local: NaiveDateTime) -> TriggerResult<DateTime<Utc>> {
    let start = local
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(local);
    (1..=GAP_SEARCH_MINUTES)
        .map(|minutes| start + Duration::minutes(minutes))
        .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| TriggerError::InvalidLocalTime(local.to_string()))
}

/// A parsed cron expression.
///
/// Accepts six or seven fields (`sec min hour day-of-month month day-of-week [year]`).
/// A `?` field is read as `*`.
#[derive(Clone)]
pub struct CronSpec {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSpec {
    pub fn parse(expression: &str) -> TriggerResult<Self> {
        let normalized = expression
            .split_whitespace()
            .map(|field| if field == "?" { "*" } else { field })
            .collect::<Vec<_>>()
            .join(" ");
        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|e| TriggerError::InvalidCron {
                expression: expression.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            expression: expression.trim().to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `after`, evaluated on the wall clock of `tz`.
    ///
    /// Returns `None` when the expression has no further occurrences.
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> TriggerResult<Option<DateTime<Utc>>> {
        let mut cursor = after.with_timezone(&tz).naive_local();
        for _ in 0..MAX_ADVANCE_ITERATIONS {
            // The schedule walks naive wall-clock time, so feed it local time labelled as UTC.
            let Some(next) = self.schedule.after(&Utc.from_utc_datetime(&cursor)).next() else {
                return Ok(None);
            };
            let naive = next.naive_utc();
            let instant = resolve_local(tz, naive)?;
            if instant > after {
                return Ok(Some(instant));
            }
            cursor = naive;
        }
        Err(TriggerError::AdvanceLimitExceeded(MAX_ADVANCE_ITERATIONS))
    }
}

impl fmt::Debug for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSpec").field(&self.expression).finish()
    }
}

impl PartialEq for CronSpec {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

/// Serde adapter storing a timezone as its IANA id.
pub mod serde_tz {
    use chrono_tz::Tz;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Tz, D::Error> {
        let id = String::deserialize(deserializer)?;
        super::parse_timezone(&id).map_err(serde::de::Error::custom)
    }
}

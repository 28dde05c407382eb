//! Condition checkers: named, evaluable predicates bound into a [`Condition`].
//!
//! Every checker serializes to a tagged record (`{"type": <tag>, "id": <id>, ...}`) and
//! is rebuilt through the checker registry, so new kinds plug in without touching the
//! condition or trigger code.
//!
//! [`Condition`]: crate::condition::Condition

mod constant;
mod execution;
mod sla_checker;
mod threshold;
mod time_checker;

pub use constant::ConstantChecker;
pub use execution::{ExecutionChecker, ExecutionTarget};
pub use sla_checker::SlaChecker;
pub use threshold::{Comparator, ThresholdChecker};
pub use time_checker::{TimeChecker, TimeCheckerBuilder};

use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{TriggerError, TriggerResult};

/// Value produced by a checker.
///
/// Not necessarily boolean; the expression evaluator interprets it by truthiness.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckerValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Null,
}

impl CheckerValue {
    /// Non-zero numbers and `true` are truthy; `Null` and NaN are not.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0 && !f.is_nan(),
            Self::Null => false,
        }
    }
}

impl From<bool> for CheckerValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CheckerValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for CheckerValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Option<f64>> for CheckerValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Float)
    }
}

impl fmt::Display for CheckerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Null => f.write_str("null"),
        }
    }
}

/// A named predicate or value source.
///
/// `now` is supplied by the caller so one scan evaluates every checker against the same
/// instant.
#[async_trait]
pub trait ConditionChecker: Send + Sync + fmt::Debug {
    /// Id unique within the owning condition.
    fn id(&self) -> &str;

    /// Registered type tag.
    fn type_tag(&self) -> &str;

    /// Evaluate the checker.
    async fn eval(&mut self, now: DateTime<Utc>) -> TriggerResult<CheckerValue>;

    /// Invoke a named method from a condition expression. `eval` is always available.
    async fn call(&mut self, method: &str, now: DateTime<Utc>) -> TriggerResult<CheckerValue> {
        match method {
            "eval" => self.eval(now).await,
            other => Err(TriggerError::UnknownMethod {
                checker: self.id().to_string(),
                method: other.to_string(),
            }),
        }
    }

    /// Clear any remembered "already met" state and rearm.
    fn reset(&mut self, now: DateTime<Utc>) -> TriggerResult<()>;

    /// Earliest instant this checker's answer could change, if it knows one.
    fn next_check_time(&self) -> Option<DateTime<Utc>>;

    /// Serialize to a tagged record.
    fn to_record(&self) -> TriggerResult<serde_json::Value>;

    fn as_any(&self) -> &dyn Any;
}

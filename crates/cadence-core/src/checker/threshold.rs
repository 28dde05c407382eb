//! Metric threshold checker with a latch.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CheckerValue, ConditionChecker};
use crate::error::{TriggerError, TriggerResult};
use crate::metric::MetricStore;
use crate::record;

/// Comparison applied between the reading and the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Comparator {
    #[default]
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
}

impl Comparator {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Greater => value > threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::Less => value < threshold,
            Self::LessOrEqual => value <= threshold,
            Self::Equal => value == threshold,
        }
    }
}

/// Latches true the first time the named metric crosses the threshold.
///
/// The latch stays set on later evaluations even if the reading falls back, until
/// [`reset`](ConditionChecker::reset) clears it. Expressions can also call `value()` to
/// read the raw metric.
#[derive(Debug, Clone)]
pub struct ThresholdChecker {
    id: String,
    metric: String,
    threshold: f64,
    comparator: Comparator,
    latched: bool,
    metrics: Arc<MetricStore>,
}

#[derive(Serialize, Deserialize)]
struct ThresholdRecord {
    id: String,
    metric: String,
    threshold: f64,
    #[serde(default)]
    comparator: Comparator,
    #[serde(default)]
    latched: bool,
}

impl ThresholdChecker {
    pub const TYPE: &'static str = "ThresholdChecker";

    pub fn new(
        id: impl Into<String>,
        metric: impl Into<String>,
        threshold: f64,
        metrics: Arc<MetricStore>,
    ) -> Self {
        Self {
            id: id.into(),
            metric: metric.into(),
            threshold,
            comparator: Comparator::default(),
            latched: false,
            metrics,
        }
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn from_record(value: &serde_json::Value, metrics: Arc<MetricStore>) -> TriggerResult<Self> {
        let r: ThresholdRecord = record::decode(Self::TYPE, value)?;
        Ok(Self {
            id: r.id,
            metric: r.metric,
            threshold: r.threshold,
            comparator: r.comparator,
            latched: r.latched,
            metrics,
        })
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }
}

#[async_trait]
impl ConditionChecker for ThresholdChecker {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn eval(&mut self, _now: DateTime<Utc>) -> TriggerResult<CheckerValue> {
        if !self.latched {
            if let Some(value) = self.metrics.get(&self.metric) {
                self.latched = self.comparator.holds(value, self.threshold);
            }
        }
        Ok(self.latched.into())
    }

    async fn call(&mut self, method: &str, now: DateTime<Utc>) -> TriggerResult<CheckerValue> {
        match method {
            "value" => Ok(self.metrics.get(&self.metric).into()),
            "eval" => self.eval(now).await,
            other => Err(TriggerError::UnknownMethod {
                checker: self.id.clone(),
                method: other.to_string(),
            }),
        }
    }

    fn reset(&mut self, _now: DateTime<Utc>) -> TriggerResult<()> {
        self.latched = false;
        Ok(())
    }

    fn next_check_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn to_record(&self) -> TriggerResult<serde_json::Value> {
        record::tagged(
            Self::TYPE,
            &ThresholdRecord {
                id: self.id.clone(),
                metric: self.metric.clone(),
                threshold: self.threshold,
                comparator: self.comparator,
                latched: self.latched,
            },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latches_once_exceeded() {
        let metrics = Arc::new(MetricStore::new());
        let mut checker = ThresholdChecker::new("load", "load.avg", 10.0, metrics.clone());
        let now = Utc::now();

        assert_eq!(checker.eval(now).await.unwrap(), CheckerValue::Bool(false));
        metrics.set("load.avg", 15.0);
        assert_eq!(checker.eval(now).await.unwrap(), CheckerValue::Bool(true));
        metrics.set("load.avg", 1.0);
        assert_eq!(checker.eval(now).await.unwrap(), CheckerValue::Bool(true));

        checker.reset(now).unwrap();
        assert_eq!(checker.eval(now).await.unwrap(), CheckerValue::Bool(false));
    }

    #[tokio::test]
    async fn test_value_method_and_comparator() {
        let metrics = Arc::new(MetricStore::new());
        metrics.set("free.disk", 3.0);
        let mut checker = ThresholdChecker::new("disk", "free.disk", 5.0, metrics)
            .with_comparator(Comparator::Less);
        let now = Utc::now();
        assert_eq!(checker.call("value", now).await.unwrap(), CheckerValue::Float(3.0));
        assert!(checker.call("eval", now).await.unwrap().is_truthy());
        assert!(checker.call("bogus", now).await.is_err());
    }

    #[test]
    fn test_record_round_trip_keeps_latch() {
        let metrics = Arc::new(MetricStore::new());
        let mut checker = ThresholdChecker::new("load", "load.avg", 10.0, metrics.clone())
            .with_comparator(Comparator::GreaterOrEqual);
        checker.latched = true;
        let value = checker.to_record().unwrap();
        assert_eq!(value["comparator"], ">=");
        let back = ThresholdChecker::from_record(&value, metrics).unwrap();
        assert!(back.is_latched());
        assert_eq!(back.metric(), "load.avg");
    }
}

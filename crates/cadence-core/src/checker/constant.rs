//! Constant checker.

use std::any::Any;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CheckerValue, ConditionChecker};
use crate::error::TriggerResult;
use crate::record;

/// Always evaluates to the same value. Used for never-expiring triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantChecker {
    id: String,
    value: bool,
}

impl ConstantChecker {
    pub const TYPE: &'static str = "ConstantChecker";

    pub fn new(id: impl Into<String>, value: bool) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    pub fn from_record(value: &serde_json::Value) -> TriggerResult<Self> {
        record::decode(Self::TYPE, value)
    }
}

#[async_trait]
impl ConditionChecker for ConstantChecker {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &str {
        Self::TYPE
    }

    async fn eval(&mut self, _now: DateTime<Utc>) -> TriggerResult<CheckerValue> {
        Ok(self.value.into())
    }

    fn reset(&mut self, _now: DateTime<Utc>) -> TriggerResult<()> {
        Ok(())
    }

    fn next_check_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn to_record(&self) -> TriggerResult<serde_json::Value> {
        record::tagged(Self::TYPE, self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

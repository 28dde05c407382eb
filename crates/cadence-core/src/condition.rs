//! A boolean expression bound to a set of named checkers.

use std::any::Any;

use chrono::{DateTime, Utc};

use crate::checker::ConditionChecker;
use crate::error::TriggerResult;
use crate::expr::{self, CheckerMap, Expr};
use crate::record::ConditionRecord;
use crate::registry::CheckerRegistry;

#[cfg(test)]
#[path = "condition_tests.rs"]
mod tests;

/// Checkers keyed by id plus an expression over them.
///
/// The expression is parsed lazily so a malformed expression or an unbound identifier
/// surfaces when the condition is evaluated, not when it is built.
#[derive(Debug)]
pub struct Condition {
    checkers: CheckerMap,
    expression: String,
    parsed: Option<Expr>,
}

impl Condition {
    pub fn new(checkers: Vec<Box<dyn ConditionChecker>>, expression: impl Into<String>) -> Self {
        let checkers = checkers
            .into_iter()
            .map(|c| (c.id().to_string(), c))
            .collect();
        let expression = expression.into();
        let parsed = Expr::parse(&expression).ok();
        Self {
            checkers,
            expression,
            parsed,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Replace the expression. Checker state is kept.
    pub fn set_expression(&mut self, expression: impl Into<String>) {
        self.expression = expression.into();
        self.parsed = Expr::parse(&self.expression).ok();
    }

    pub fn checker(&self, id: &str) -> Option<&dyn ConditionChecker> {
        self.checkers.get(id).map(|c| c.as_ref())
    }

    /// Borrow a checker as its concrete type.
    pub fn checker_as<T: Any>(&self, id: &str) -> Option<&T> {
        self.checker(id).and_then(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn checkers(&self) -> impl Iterator<Item = &dyn ConditionChecker> {
        self.checkers.values().map(|c| c.as_ref())
    }

    /// Evaluate the expression.
    pub async fn is_met(&mut self, now: DateTime<Utc>) -> TriggerResult<bool> {
        if self.parsed.is_none() {
            self.parsed = Some(Expr::parse(&self.expression)?);
        }
        match &self.parsed {
            Some(parsed) => expr::evaluate(parsed, &mut self.checkers, now).await,
            None => Ok(false),
        }
    }

    /// Earliest next-check time among the referenced checkers.
    ///
    /// Falls back to every bound checker when the expression does not parse.
    pub fn next_check_time(&self) -> Option<DateTime<Utc>> {
        match &self.parsed {
            Some(parsed) => parsed
                .references()
                .into_iter()
                .filter_map(|id| self.checkers.get(id))
                .filter_map(|c| c.next_check_time())
                .min(),
            None => self.checkers.values().filter_map(|c| c.next_check_time()).min(),
        }
    }

    /// Reset every bound checker. All checkers are reset even if one fails; the first
    /// failure is returned.
    pub fn reset_checkers(&mut self, now: DateTime<Utc>) -> TriggerResult<()> {
        let mut first_error = None;
        for checker in self.checkers.values_mut() {
            if let Err(e) = checker.reset(now) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn to_record(&self) -> TriggerResult<ConditionRecord> {
        let checkers = self
            .checkers
            .iter()
            .map(|(id, c)| Ok((id.clone(), c.to_record()?)))
            .collect::<TriggerResult<_>>()?;
        Ok(ConditionRecord {
            checkers,
            expr: self.expression.clone(),
        })
    }

    pub fn from_record(
        record: &ConditionRecord,
        registry: &CheckerRegistry,
        now: DateTime<Utc>,
    ) -> TriggerResult<Self> {
        let checkers = record
            .checkers
            .values()
            .map(|value| registry.create(value, now))
            .collect::<TriggerResult<Vec<_>>>()?;
        Ok(Self::new(checkers, record.expr.clone()))
    }
}

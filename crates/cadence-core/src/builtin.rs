//! Registration of the built-in checker and action types.

use std::sync::Arc;

use crate::action::{
    CreateTriggerAction, ExecuteFlowAction, KillExecutionAction, SendEmailAction, SlaAlertAction,
    WatchSlaAction,
};
use crate::checker::{ConstantChecker, ExecutionChecker, SlaChecker, ThresholdChecker, TimeChecker};
use crate::flow::FlowExecutor;
use crate::metric::MetricStore;
use crate::notify::Notifier;
use crate::registry::Registries;

/// Runtime dependencies injected into decoded checkers and actions.
#[derive(Clone)]
pub struct Collaborators {
    pub flow_executor: Arc<dyn FlowExecutor>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Arc<MetricStore>,
}

/// Register every built-in type with `collaborators` captured.
pub fn register_builtin_types(registries: &Registries, collaborators: &Collaborators) {
    let checkers = &registries.checkers;
    checkers.register(TimeChecker::TYPE, |value, now| {
        Ok(Box::new(TimeChecker::from_record(value, now)?))
    });
    checkers.register(ConstantChecker::TYPE, |value, _now| {
        Ok(Box::new(ConstantChecker::from_record(value)?))
    });
    let metrics = collaborators.metrics.clone();
    checkers.register(ThresholdChecker::TYPE, move |value, _now| {
        Ok(Box::new(ThresholdChecker::from_record(value, metrics.clone())?))
    });
    let executor = collaborators.flow_executor.clone();
    checkers.register(SlaChecker::TYPE, move |value, _now| {
        Ok(Box::new(SlaChecker::from_record(value, executor.clone())?))
    });
    let executor = collaborators.flow_executor.clone();
    checkers.register(ExecutionChecker::TYPE, move |value, _now| {
        Ok(Box::new(ExecutionChecker::from_record(value, executor.clone())?))
    });

    let actions = &registries.actions;
    let (executor, notifier) = (collaborators.flow_executor.clone(), collaborators.notifier.clone());
    actions.register(ExecuteFlowAction::TYPE, move |value, _now| {
        Ok(Box::new(ExecuteFlowAction::from_record(
            value,
            executor.clone(),
            notifier.clone(),
        )?))
    });
    let notifier = collaborators.notifier.clone();
    actions.register(SendEmailAction::TYPE, move |value, _now| {
        Ok(Box::new(SendEmailAction::from_record(value, notifier.clone())?))
    });
    let executor = collaborators.flow_executor.clone();
    actions.register(KillExecutionAction::TYPE, move |value, _now| {
        Ok(Box::new(KillExecutionAction::from_record(value, executor.clone())?))
    });
    actions.register(CreateTriggerAction::TYPE, |value, _now| {
        Ok(Box::new(CreateTriggerAction::from_record(value)?))
    });
    let (executor, notifier) = (collaborators.flow_executor.clone(), collaborators.notifier.clone());
    actions.register(WatchSlaAction::TYPE, move |value, _now| {
        Ok(Box::new(WatchSlaAction::from_record(
            value,
            executor.clone(),
            notifier.clone(),
        )?))
    });
    let (executor, notifier) = (collaborators.flow_executor.clone(), collaborators.notifier.clone());
    actions.register(SlaAlertAction::TYPE, move |value, _now| {
        Ok(Box::new(SlaAlertAction::from_record(
            value,
            executor.clone(),
            notifier.clone(),
        )?))
    });
}

//! # Cadence Core
//!
//! Trigger model for the cadence scheduling engine.
//!
//! ## Components
//!
//! - [`Trigger`] - a fire condition, an expire condition, actions and a status machine
//! - [`Condition`] - a boolean expression over named [`ConditionChecker`]s
//! - [`TimeChecker`] - period and cron recurrence in any IANA timezone
//! - [`TriggerAction`] - side effects run in order when a trigger fires
//! - [`Registries`] - type-tag to constructor maps used to rebuild persisted triggers
//!
//! Collaborators outside the engine (flow backend, notifier, trigger store) are traits:
//! [`FlowExecutor`], [`Notifier`] and [`TriggerLoader`].

pub mod action;
pub mod builtin;
pub mod checker;
pub mod condition;
pub mod error;
pub mod expr;
pub mod flow;
pub mod loader;
pub mod metric;
pub mod notify;
pub mod record;
pub mod registry;
pub mod sla;
pub mod time;
pub mod trigger;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use action::{ActionContext, FiringOutcome, TriggerAction, TriggerRequest};
pub use builtin::{register_builtin_types, Collaborators};
pub use checker::{CheckerValue, ConditionChecker, TimeChecker};
pub use condition::Condition;
pub use error::{TriggerError, TriggerResult};
pub use flow::{ExecutableFlow, ExecutionId, FlowExecutor, Status};
pub use loader::{MemoryTriggerLoader, TriggerLoader};
pub use metric::MetricStore;
pub use notify::{Email, Notifier};
pub use record::TriggerRecord;
pub use registry::Registries;
pub use sla::{SlaOption, SlaType};
pub use time::{CronSpec, Period, PeriodUnit};
pub use trigger::{TickOutcome, Trigger, TriggerId, TriggerStatus, Verdict};

//! Adapters connecting the cadence engine to the outside world.
//!
//! - [`HttpFlowExecutor`] submits, polls and cancels flow executions over HTTP
//! - [`WebhookNotifier`] posts notifications as JSON
//! - [`LogNotifier`] writes notifications to the tracing log

mod error;
mod executor;
mod notifier;

pub use error::AdapterError;
pub use executor::HttpFlowExecutor;
pub use notifier::{LogNotifier, WebhookNotifier};

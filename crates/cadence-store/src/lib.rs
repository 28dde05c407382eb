//! SQLite trigger store for cadence.
//!
//! Each trigger is one row holding its JSON record, with the source and last
//! modification time broken out for filtering.

mod loader;
mod schema;

pub use loader::{SqliteTriggerLoader, StoreError};

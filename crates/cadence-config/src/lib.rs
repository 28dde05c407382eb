//! # Cadence Config
//!
//! TOML configuration for the cadence scheduler, with `${VAR}` substitution.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};

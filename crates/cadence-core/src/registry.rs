//! Type registries mapping persisted type tags to constructors.
//!
//! A record carries only a tag and a type-specific body. Constructors are registered at
//! startup with their collaborators captured, so decoding needs no global state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::action::TriggerAction;
use crate::checker::ConditionChecker;
use crate::error::{TriggerError, TriggerResult};
use crate::record;

/// Constructor from a persisted record.
pub type Factory<T> = Arc<dyn Fn(&Value, DateTime<Utc>) -> TriggerResult<Box<T>> + Send + Sync>;

/// Registry of constructors for one family of types.
pub struct TypeRegistry<T: ?Sized> {
    kind: &'static str,
    factories: RwLock<HashMap<String, Factory<T>>>,
}

impl<T: ?Sized> TypeRegistry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a constructor, replacing any previous one for the tag.
    pub fn register<F>(&self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&Value, DateTime<Utc>) -> TriggerResult<Box<T>> + Send + Sync + 'static,
    {
        self.factories.write().insert(tag.into(), Arc::new(factory));
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.factories.read().contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn supported_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.factories.read().keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Build an instance from a record whose tag is read from the record itself.
    pub fn create(&self, value: &Value, now: DateTime<Utc>) -> TriggerResult<Box<T>> {
        let tag = record::type_tag(value)?;
        self.create_from_persisted(tag, value, now)
    }

    /// Build an instance of `tag` from a record.
    pub fn create_from_persisted(
        &self,
        tag: &str,
        value: &Value,
        now: DateTime<Utc>,
    ) -> TriggerResult<Box<T>> {
        let factory = self
            .factories
            .read()
            .get(tag)
            .cloned()
            .ok_or_else(|| TriggerError::UnknownType {
                kind: self.kind,
                tag: tag.to_string(),
            })?;
        factory(value, now)
    }
}

/// Registry of checker constructors.
pub type CheckerRegistry = TypeRegistry<dyn ConditionChecker>;

/// Registry of action constructors.
pub type ActionRegistry = TypeRegistry<dyn TriggerAction>;

/// Both registries, shared by everything that decodes triggers.
#[derive(Clone)]
pub struct Registries {
    pub checkers: Arc<CheckerRegistry>,
    pub actions: Arc<ActionRegistry>,
}

impl Registries {
    /// Empty registries.
    pub fn new() -> Self {
        Self {
            checkers: Arc::new(CheckerRegistry::new("checker")),
            actions: Arc::new(ActionRegistry::new("action")),
        }
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

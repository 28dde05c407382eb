//! Trigger persistence interface and an in-memory implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{TriggerError, TriggerResult};
use crate::record::TriggerRecord;
use crate::trigger::TriggerId;

/// Durable store of trigger records.
#[async_trait]
pub trait TriggerLoader: Send + Sync {
    /// Store a new trigger and return its assigned id.
    async fn add_trigger(&self, record: &TriggerRecord) -> TriggerResult<TriggerId>;

    /// Overwrite a stored trigger. The record must carry an id.
    async fn update_trigger(&self, record: &TriggerRecord) -> TriggerResult<()>;

    async fn remove_trigger(&self, id: TriggerId) -> TriggerResult<()>;

    async fn load_trigger(&self, id: TriggerId) -> TriggerResult<Option<TriggerRecord>>;

    async fn load_triggers(&self) -> TriggerResult<Vec<TriggerRecord>>;

    /// Triggers modified strictly after `since`.
    async fn load_updated_triggers(&self, since: DateTime<Utc>) -> TriggerResult<Vec<TriggerRecord>>;
}

/// Non-durable loader for tests and `--in-memory` runs.
#[derive(Debug, Default)]
pub struct MemoryTriggerLoader {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: TriggerId,
    records: BTreeMap<TriggerId, TriggerRecord>,
}

impl MemoryTriggerLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TriggerLoader for MemoryTriggerLoader {
    async fn add_trigger(&self, record: &TriggerRecord) -> TriggerResult<TriggerId> {
        let mut state = self.inner.lock();
        state.next_id += 1;
        let id = state.next_id;
        let mut stored = record.clone();
        stored.trigger_id = Some(id);
        state.records.insert(id, stored);
        Ok(id)
    }

    async fn update_trigger(&self, record: &TriggerRecord) -> TriggerResult<()> {
        let id = record
            .trigger_id
            .ok_or_else(|| TriggerError::Persistence("cannot update a trigger without an id".into()))?;
        let mut state = self.inner.lock();
        match state.records.get_mut(&id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(TriggerError::Persistence(format!("trigger {id} does not exist"))),
        }
    }

    async fn remove_trigger(&self, id: TriggerId) -> TriggerResult<()> {
        self.inner.lock().records.remove(&id);
        Ok(())
    }

    async fn load_trigger(&self, id: TriggerId) -> TriggerResult<Option<TriggerRecord>> {
        Ok(self.inner.lock().records.get(&id).cloned())
    }

    async fn load_triggers(&self) -> TriggerResult<Vec<TriggerRecord>> {
        Ok(self.inner.lock().records.values().cloned().collect())
    }

    async fn load_updated_triggers(&self, since: DateTime<Utc>) -> TriggerResult<Vec<TriggerRecord>> {
        Ok(self
            .inner
            .lock()
            .records
            .values()
            .filter(|r| r.last_modify_time > since)
            .cloned()
            .collect())
    }
}

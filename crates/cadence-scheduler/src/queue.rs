//! Due-time queue for the scan loop.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};

use cadence_core::TriggerId;

/// Min-heap of trigger ids keyed by the time they are next due.
///
/// Rescheduling or removing a trigger leaves its old heap entry in place; entries that
/// no longer match the trigger's current due time are dropped when they surface, and the
/// heap is compacted once stale entries outnumber live ones.
#[derive(Debug, Default)]
pub struct ScanQueue {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, TriggerId)>>,
    due: HashMap<TriggerId, DateTime<Utc>>,
}

impl ScanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the due time of `id`, replacing any earlier entry.
    pub fn schedule(&mut self, id: TriggerId, at: DateTime<Utc>) {
        self.due.insert(id, at);
        self.heap.push(Reverse((at, id)));
        self.compact();
    }

    pub fn remove(&mut self, id: TriggerId) {
        if self.due.remove(&id).is_some() {
            self.compact();
        }
    }

    pub fn contains(&self, id: TriggerId) -> bool {
        self.due.contains_key(&id)
    }

    pub fn due_time(&self, id: TriggerId) -> Option<DateTime<Utc>> {
        self.due.get(&id).copied()
    }

    /// Number of scheduled triggers.
    pub fn len(&self) -> usize {
        self.due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }

    /// Earliest due time.
    pub fn peek(&mut self) -> Option<DateTime<Utc>> {
        self.discard_stale();
        self.heap.peek().map(|Reverse((at, _))| *at)
    }

    /// Remove and return every trigger due at or before `now`, soonest first.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<TriggerId> {
        let mut ready = Vec::new();
        loop {
            self.discard_stale();
            match self.heap.peek() {
                Some(Reverse((at, id))) if *at <= now => {
                    let id = *id;
                    self.heap.pop();
                    self.due.remove(&id);
                    ready.push(id);
                }
                _ => break,
            }
        }
        ready
    }

    /// Drop every stale entry when the heap holds more than twice the live ones.
    fn compact(&mut self) {
        if self.heap.len() <= 2 * self.due.len() + 1 {
            return;
        }
        let due = &self.due;
        self.heap.retain(|Reverse((at, id))| due.get(id) == Some(at));
    }

    fn discard_stale(&mut self) {
        while let Some(Reverse((at, id))) = self.heap.peek() {
            if self.due.get(id) == Some(at) {
                break;
            }
            self.heap.pop();
        }
    }
}

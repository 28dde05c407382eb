//! Named numeric readings shared between producers and threshold checkers.

use dashmap::DashMap;

/// Concurrent store of metric readings.
#[derive(Debug, Default)]
pub struct MetricStore {
    values: DashMap<String, f64>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a reading.
    pub fn set(&self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Add to a reading, starting from zero. Returns the new value.
    pub fn add(&self, name: impl Into<String>, delta: f64) -> f64 {
        let mut entry = self.values.entry(name.into()).or_insert(0.0);
        *entry += delta;
        *entry
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(|v| *v)
    }

    pub fn remove(&self, name: &str) -> Option<f64> {
        self.values.remove(name).map(|(_, v)| v)
    }
}

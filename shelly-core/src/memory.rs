// ABOUTME: Per-conversation key/value memory owned by one bot instance.
// ABOUTME: Never shared between rooms and never persisted.

use serde_json::{Map, Value};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the memory from a mapping, typically the `bot.store` settings
    pub fn from_settings(settings: Option<Value>) -> Self {
        let values = match settings {
            Some(Value::Object(map)) => map,
            Some(other) => {
                tracing::warn!(value = %other, "Ignoring bot store settings that are not a mapping");
                Map::new()
            }
            None => Map::new(),
        };
        Self {
            values: Mutex::new(values),
        }
    }

    fn values(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn remember(&self, key: &str, value: impl Into<Value>) {
        self.values().insert(key.to_string(), value.into());
    }

    pub fn recall(&self, key: &str) -> Option<Value> {
        self.values().get(key).cloned()
    }

    pub fn recall_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.recall(key).unwrap_or_else(|| default.into())
    }

    /// Forget one key, or everything when `key` is `None`
    pub fn forget(&self, key: Option<&str>) {
        let mut values = self.values();
        match key {
            Some(key) => {
                values.remove(key);
            }
            None => values.clear(),
        }
    }

    /// Push onto the list at `key`, starting a new list when needed
    pub fn append(&self, key: &str, item: impl Into<Value>) {
        let mut values = self.values();
        let slot = values
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            items.push(item.into());
        }
    }

    /// Add `delta`; a missing or non-numeric value counts as 0
    pub fn increment(&self, key: &str, delta: i64) -> i64 {
        let mut values = self.values();
        let next = values.get(key).and_then(Value::as_i64).unwrap_or(0) + delta;
        values.insert(key.to_string(), Value::from(next));
        next
    }

    pub fn decrement(&self, key: &str, delta: i64) -> i64 {
        self.increment(key, -delta)
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }
}

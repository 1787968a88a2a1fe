//! Data Bus
//!
//! The shared key/value store every plugin reads from and writes to. Handles
//! are cheap to clone and all clones share one store. The lookup failure mode
//! (`strict_pending`) belongs to the handle, so the stat batch can switch its
//! own handle to "not yet" semantics while collectors running concurrently on
//! other handles keep getting hard `NotFound` errors.

use std::fmt;
use std::sync::Arc;

use meguca_types::DataMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BusError, BusResult};

/// Handle to the shared data bus
#[derive(Clone, Default)]
pub struct DataBus {
    entries: Arc<RwLock<DataMap>>,
    strict_pending: bool,
}

impl DataBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus pre-populated with entries
    pub fn with_entries(entries: DataMap) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
            strict_pending: false,
        }
    }

    /// Read a value
    ///
    /// A missing key yields [`BusError::NotYetExist`] when this handle is in
    /// strict-pending mode and [`BusError::NotFound`] otherwise.
    pub fn get(&self, key: &str) -> BusResult<Value> {
        match self.entries.read().get(key) {
            Some(value) => Ok(value.clone()),
            None => Err(self.missing(key)),
        }
    }

    /// Read a value and deserialize it
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> BusResult<T> {
        let value = self.get(key)?;
        serde_json::from_value(value).map_err(|e| BusError::Decode {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Merge a plugin's output into the bus
    ///
    /// The whole mapping is applied under one write lock, so readers never
    /// observe half of a plugin's output. Existing keys are overwritten.
    /// Returns the number of keys written.
    pub fn set_all(&self, mapping: DataMap) -> usize {
        if mapping.is_empty() {
            return 0;
        }

        let count = mapping.len();
        self.entries.write().extend(mapping);
        count
    }

    /// Write a single value
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.write().insert(key.into(), value.into());
    }

    /// Switch this handle's lookup failure mode
    pub fn set_strict_pending(&mut self, strict: bool) {
        self.strict_pending = strict;
    }

    pub fn strict_pending(&self) -> bool {
        self.strict_pending
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Consistent copy of the whole bus
    pub fn snapshot(&self) -> DataMap {
        self.entries.read().clone()
    }

    fn missing(&self, key: &str) -> BusError {
        if self.strict_pending {
            BusError::NotYetExist(key.to_string())
        } else {
            BusError::NotFound(key.to_string())
        }
    }
}

impl fmt::Debug for DataBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBus")
            .field("keys", &self.len())
            .field("strict_pending", &self.strict_pending)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> DataMap {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_get_existing_item() {
        let bus = DataBus::new();
        bus.set_all(map(json!({"a": "1"})));

        assert_eq!(bus.get("a"), Ok(json!("1")));
    }

    #[test]
    fn test_missing_key_depends_on_mode() {
        let mut bus = DataBus::new();
        bus.set_all(map(json!({"a": "1"})));

        assert_eq!(bus.get("b"), Err(BusError::NotFound("b".to_string())));

        bus.set_strict_pending(true);
        assert_eq!(bus.get("b"), Err(BusError::NotYetExist("b".to_string())));

        bus.set_strict_pending(false);
        assert_eq!(bus.get("b"), Err(BusError::NotFound("b".to_string())));
    }

    #[test]
    fn test_strict_mode_is_per_handle() {
        let shared = DataBus::new();
        let mut strict = shared.clone();
        strict.set_strict_pending(true);

        strict.insert("written", 1);

        assert_eq!(shared.get("written"), Ok(json!(1)));
        assert!(matches!(shared.get("x"), Err(BusError::NotFound(_))));
        assert!(matches!(strict.get("x"), Err(BusError::NotYetExist(_))));
    }

    #[test]
    fn test_merge_is_idempotent_and_last_write_wins() {
        let bus = DataBus::new();
        let output = map(json!({"x": 1, "y": [1, 2]}));

        bus.set_all(output.clone());
        let once = bus.snapshot();
        bus.set_all(output);
        assert_eq!(bus.snapshot(), once);

        bus.set_all(map(json!({"x": 2})));
        assert_eq!(bus.get("x"), Ok(json!(2)));
        assert_eq!(bus.keys(), vec!["x", "y"]);
    }

    #[test]
    fn test_empty_merge_is_noop() {
        let bus = DataBus::new();
        assert_eq!(bus.set_all(DataMap::new()), 0);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_typed_get() {
        let bus = DataBus::with_entries(map(json!({"count": 3, "name": "Osiris"})));

        assert_eq!(bus.get_as::<u64>("count"), Ok(3));
        assert!(matches!(
            bus.get_as::<u64>("name"),
            Err(BusError::Decode { ref key, .. }) if key == "name"
        ));
    }

    #[test]
    fn test_concurrent_merges_are_atomic() {
        let bus = DataBus::new();
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        bus.set_all(map(json!({"left": i, "right": i})));
                    }
                })
            })
            .collect();

        for _ in 0..100 {
            let snapshot = bus.snapshot();
            assert_eq!(snapshot.get("left"), snapshot.get("right"));
        }

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(bus.len(), 2);
    }
}

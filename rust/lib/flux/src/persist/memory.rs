use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::PersistError;
use crate::persist::PersistStore;
use crate::value::StateValue;

/// In-process persistence, mostly for tests and hosts without storage.
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, StateValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StateValue>, PersistError> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, data: &StateValue) -> Result<(), PersistError> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), data.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let store = MemoryStore::new();
        store.set("app:n", &StateValue::from(3i64)).unwrap();
        assert_eq!(store.get("app:n").unwrap(), Some(StateValue::from(3i64)));
    }

    #[test]
    fn get_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("nothing").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn set_overwrites_and_keys_sorted() {
        let store = MemoryStore::new();
        store.set("b", &StateValue::from(1i64)).unwrap();
        store.set("a", &StateValue::from(1i64)).unwrap();
        store.set("b", &StateValue::from(2i64)).unwrap();
        assert_eq!(store.keys(), vec!["a", "b"]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("b").unwrap(), Some(StateValue::from(2i64)));
    }

    #[test]
    fn stored_value_is_shared_not_copied() {
        let store = MemoryStore::new();
        let value = StateValue::from(serde_json::json!({"big": [1, 2, 3]}));
        store.set("k", &value).unwrap();
        assert!(store.get("k").unwrap().unwrap().same(&value));
    }
}

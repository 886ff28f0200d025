use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::prelude::*;

/// A persistent string-keyed store, shared with other users so implementations should only ever
/// touch the keys they're given.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result;
    fn remove(&self, key: &str) -> Result;
}

impl<K: KeyValueStore + ?Sized> KeyValueStore for Arc<K> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) -> Result {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result {
        (**self).remove(key)
    }
}

/// Store that lives only as long as the process, useful for hosts without persistence
#[derive(Debug, Default)]
pub struct MemoryStore(Mutex<HashMap<String, String>>);

impl MemoryStore {
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self(Mutex::new(HashMap::from([(key.into(), value.into())])))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result {
        let mut map = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result {
        let mut map = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        map.remove(key);
        Ok(())
    }
}

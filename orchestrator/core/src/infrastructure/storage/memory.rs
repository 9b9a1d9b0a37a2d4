// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory key-value store for tests and single-process development.

use crate::domain::persistence::{KeyValueStore, StorageError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::persistence::{get_decoded, put_encoded};

    #[test]
    fn test_put_get_delete() {
        let store = InMemoryKeyValueStore::new();
        store.put("a", vec![1, 2, 3]).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(vec![1, 2, 3]));

        store.put("a", vec![4]).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(vec![4]));

        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        // deleting again is fine
        store.delete("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_encoded_values() {
        let store = InMemoryKeyValueStore::new();
        put_encoded(&store, "pair", &(7u64, "seven".to_string())).unwrap();
        let decoded: Option<(u64, String)> = get_decoded(&store, "pair").unwrap();
        assert_eq!(decoded, Some((7, "seven".to_string())));

        store.put("garbage", vec![0xff]).unwrap();
        let broken: Result<Option<(u64, String)>, _> = get_decoded(&store, "garbage");
        assert!(matches!(broken, Err(StorageError::Decode { .. })));
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Durable key-value store backed by an embedded sled database.
//!
//! Every `put`/`delete` is flushed before returning so that a crash after an
//! acknowledged write cannot lose it. This matters for the replicated log:
//! a node must not acknowledge an entry it could forget.

use crate::domain::persistence::{KeyValueStore, StorageError};
use std::path::Path;
use tracing::debug;

pub struct SledKeyValueStore {
    db: sled::Db,
}

impl SledKeyValueStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Opening sled key-value store");
        let db = sled::open(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    /// A store that is deleted when dropped.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

impl KeyValueStore for SledKeyValueStore {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        self.flush()
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key.as_bytes())
            .map(|value| value.map(|v| v.to_vec()))
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        self.flush()
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Persistence Contract
//!
//! The only thing the mesh assumes of a durable backend: byte values under
//! string keys with `put`, `get` and `delete`. The vector index, the
//! replicated log and the swarm queue all lay their own key schemes on top.
//!
//! | Implementation | Module |
//! |----------------|--------|
//! | `InMemoryKeyValueStore` | `crate::infrastructure::storage::memory` |
//! | `SledKeyValueStore` | `crate::infrastructure::storage::sled_store` |

use crate::domain::retry::Transient;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Failed to encode value for key {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("Failed to decode value for key {key}: {reason}")]
    Decode { key: String, reason: String },
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        matches!(self, StorageError::Backend(_))
    }
}

/// Durable byte-oriented store.
///
/// Implementations must make a completed `put` visible to every later `get`
/// on the same store instance.
pub trait KeyValueStore: Send + Sync {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Encode `value` with bincode and store it under `key`.
pub fn put_encoded<T: serde::Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = bincode::serialize(value).map_err(|e| StorageError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.put(key, bytes)
}

pub fn get_decoded<T: serde::de::DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(bytes) => bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Like [`put_encoded`], but JSON. Needed for values carrying
/// `serde_json::Value`, which bincode cannot decode.
pub fn put_json<T: serde::Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value).map_err(|e| StorageError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.put(key, bytes)
}

pub fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}


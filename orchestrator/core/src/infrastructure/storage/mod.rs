// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Storage Infrastructure Module
//!
//! Concrete implementations of the [`KeyValueStore`] contract.

pub mod memory;
pub mod sled_store;

pub use memory::InMemoryKeyValueStore;
pub use sled_store::SledKeyValueStore;

use crate::domain::persistence::{KeyValueStore, StorageError};
use std::path::PathBuf;
use std::sync::Arc;

/// Storage backend configuration
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// Embedded sled database (durable)
    Sled { path: PathBuf },

    /// Process memory (development/testing)
    InMemory,
}

/// Factory function to create a key-value store from configuration
pub fn create_key_value_store(backend: StorageBackend) -> Result<Arc<dyn KeyValueStore>, StorageError> {
    match backend {
        StorageBackend::Sled { path } => Ok(Arc::new(SledKeyValueStore::open(path)?)),
        StorageBackend::InMemory => Ok(Arc::new(InMemoryKeyValueStore::new())),
    }
}

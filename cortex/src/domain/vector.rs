// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Vector entries, search results and the index error type.

use aegis_core::domain::node_config::ConfigError;
use aegis_core::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Opaque per-vector metadata. Values are matched by equality only.
pub type Metadata = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VectorId(pub Uuid);

impl VectorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VectorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored vector as returned by [`get`](crate::infrastructure::VectorIndex::get).
///
/// When the index quantizes, `vector` is the dequantized form, not the
/// original input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: VectorId,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// Input to a batch insert.
#[derive(Debug, Clone, Default)]
pub struct NewVector {
    pub id: Option<VectorId>,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

impl NewVector {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            id: None,
            vector,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// One ranked search result. Higher `score` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: VectorId,
    pub score: f32,
    pub metadata: Metadata,
}

/// Result of a deadline-bounded search.
///
/// `complete == false` means at least one shard was not consulted before
/// the deadline passed; `hits` is still ordered and valid for what was seen.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Position of the failed vector in the submitted batch.
    pub position: usize,
    pub error: IndexError,
}

/// Per-entry outcome of a batch insert. Successes keep their batch positions.
#[derive(Debug, Clone, Default)]
pub struct BatchInsertReport {
    pub inserted: Vec<(usize, VectorId)>,
    pub failed: Vec<BatchFailure>,
}

impl BatchInsertReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Counters reported by [`stats`](crate::infrastructure::VectorIndex::stats).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub live_vectors: usize,
    pub tombstones: usize,
    pub shards: usize,
    pub max_layer: usize,
    pub capacity: usize,
    /// Shard rebuilds that reclaimed tombstones since the index was opened.
    pub rebuilds: u64,
}

#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("Invalid index configuration: {0}")]
    InvalidConfig(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidValue(String),

    #[error("Index is full ({capacity} vectors)")]
    CapacityExceeded { capacity: usize },

    #[error("Vector {0} already exists")]
    DuplicateId(VectorId),

    #[error("Vector {0} not found")]
    NotFound(VectorId),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ConfigError> for IndexError {
    fn from(err: ConfigError) -> Self {
        IndexError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_report_keeps_storage_failures() {
        let report = BatchInsertReport {
            inserted: vec![(0, VectorId::new())],
            failed: vec![BatchFailure {
                position: 1,
                error: StorageError::Backend("disk full".into()).into(),
            }],
        };
        let copy = report.clone();
        assert!(!copy.is_complete());
        assert!(matches!(
            &copy.failed[0].error,
            IndexError::Storage(StorageError::Backend(reason)) if reason == "disk full"
        ));
    }
}

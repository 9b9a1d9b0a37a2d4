// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Memory entries as replicated between nodes.
//!
//! An entry is identified by its [`MemoryKey`] (namespace + key). Every local
//! write bumps the writer's component of the entry's [`VersionVector`]; the
//! wall-clock `updated_at` and `origin` node are only used to break ties
//! between concurrent writes.

use crate::domain::vector::IndexError;
use crate::domain::version_vector::VersionVector;
use aegis_core::{NodeId, ProposalError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(pub String);

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryKey {
    pub namespace: Namespace,
    pub key: String,
}

impl MemoryKey {
    pub fn new(namespace: impl Into<Namespace>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

impl From<(&str, &str)> for MemoryKey {
    fn from((namespace, key): (&str, &str)) -> Self {
        Self::new(namespace, key)
    }
}

impl fmt::Display for MemoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MemoryValue {
    Text(String),
    Bytes(Vec<u8>),
    /// Grow-only set; concurrent versions merge by union.
    Set(BTreeSet<String>),
    /// Monotonic counter; concurrent versions merge by maximum.
    Counter(i64),
}

impl MemoryValue {
    pub fn text(value: impl Into<String>) -> Self {
        MemoryValue::Text(value.into())
    }

    /// Text used for embedding and keyword matching, if the value has any.
    pub fn searchable_text(&self) -> Option<String> {
        match self {
            MemoryValue::Text(text) => Some(text.clone()),
            MemoryValue::Set(items) => Some(items.iter().cloned().collect::<Vec<_>>().join(" ")),
            MemoryValue::Bytes(bytes) => std::str::from_utf8(bytes).ok().map(str::to_string),
            MemoryValue::Counter(_) => None,
        }
    }

    /// Combine two concurrent versions. `None` when the pair is not mergeable.
    pub fn merge(&self, other: &MemoryValue) -> Option<MemoryValue> {
        match (self, other) {
            (MemoryValue::Set(a), MemoryValue::Set(b)) => {
                Some(MemoryValue::Set(a.union(b).cloned().collect()))
            }
            (MemoryValue::Counter(a), MemoryValue::Counter(b)) => {
                Some(MemoryValue::Counter(*a.max(b)))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    Immediate,
    ShortTerm,
    LongTerm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub key: MemoryKey,
    pub value: MemoryValue,
    /// In `[0, 1]`; above the promotion threshold the entry is kept long-term.
    pub importance: f32,
    pub version: VersionVector,
    pub updated_at: DateTime<Utc>,
    pub origin: NodeId,
}

impl MemoryEntry {
    /// Last-write-wins order: later wall clock first, then greater origin id.
    pub fn lww_cmp(&self, other: &MemoryEntry) -> Ordering {
        self.updated_at
            .cmp(&other.updated_at)
            .then_with(|| self.origin.cmp(&other.origin))
    }
}

/// Write options for [`store`](crate::application::MemorySynchronizer::store).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreOptions {
    pub importance: f32,
    /// Force placement. `LongTerm` promotes regardless of importance;
    /// `ShortTerm` also places the entry in the TTL tier immediately.
    pub tier_hint: Option<MemoryTier>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            importance: 0.5,
            tier_hint: None,
        }
    }
}

impl StoreOptions {
    pub fn with_importance(importance: f32) -> Self {
        Self {
            importance,
            tier_hint: None,
        }
    }
}

/// One ranked result of semantic retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedMemory {
    pub entry: MemoryEntry,
    pub score: f32,
    pub similarity: f32,
    pub keyword_match: bool,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Namespace {requester} may not read namespace {target}")]
    NamespaceDenied {
        requester: Namespace,
        target: Namespace,
    },

    #[error("Importance must be within [0, 1], got {0}")]
    InvalidImportance(f32),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Replicated write failed: {0}")]
    Proposal(#[from] ProposalError),

    #[error("Namespace {0} requires consensus but no proposer is configured")]
    ConsensusUnavailable(Namespace),

    #[error("Codec error: {0}")]
    Codec(String),
}

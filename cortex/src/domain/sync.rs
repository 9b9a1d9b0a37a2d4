// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Peer-to-peer synchronization contract.
//!
//! Every local change to a key bumps a node-local change sequence. A peer
//! asks for everything after the last sequence it saw; the answer carries the
//! new high-water mark.

use crate::domain::memory::{MemoryEntry, MemoryKey};
use aegis_core::NodeId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub entries: Vec<MemoryEntry>,
    /// Sequence to pass as `since` next time
    pub high_water: u64,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PeerError {
    #[error("Peer {0} is unreachable")]
    Unreachable(NodeId),

    #[error("Peer {peer} did not answer within {timeout:?}")]
    Timeout { peer: NodeId, timeout: Duration },

    #[error("Peer {peer} rejected the exchange: {reason}")]
    Rejected { peer: NodeId, reason: String },
}

#[async_trait]
pub trait SyncPeer: Send + Sync {
    fn node_id(&self) -> NodeId;

    /// Changes recorded by the peer after sequence `since`.
    async fn pull_changes(&self, since: u64) -> Result<ChangeSet, PeerError>;

    /// Hand the peer our changes. Returns the keys the peer had to resolve
    /// as concurrent writes.
    async fn push_changes(&self, from: NodeId, changes: ChangeSet) -> Result<Vec<MemoryKey>, PeerError>;
}

/// Per-peer result of one synchronization round.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerFailure {
    pub peer: NodeId,
    pub error: PeerError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Complete,
    /// Some peers failed; state received from the others was still applied.
    Partial,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub synced: Vec<NodeId>,
    pub failed: Vec<PeerFailure>,
    pub entries_applied: usize,
    /// Keys this node resolved as concurrent writes during the round
    pub conflicts: Vec<MemoryKey>,
}

impl SyncReport {
    pub fn outcome(&self) -> SyncOutcome {
        if self.failed.is_empty() {
            SyncOutcome::Complete
        } else {
            SyncOutcome::Partial
        }
    }
}

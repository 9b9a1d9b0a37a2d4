// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process [`SyncPeer`] over another node's synchronizer.
//!
//! Used when several mesh nodes share a process and by the sync tests.
//! Networked peers implement the same trait over their own transport.

use crate::application::memory_service::MemorySynchronizer;
use crate::domain::memory::MemoryKey;
use crate::domain::sync::{ChangeSet, PeerError, SyncPeer};
use aegis_core::NodeId;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone)]
pub struct LocalPeer {
    memory: Arc<MemorySynchronizer>,
}

impl LocalPeer {
    pub fn new(memory: Arc<MemorySynchronizer>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl SyncPeer for LocalPeer {
    fn node_id(&self) -> NodeId {
        self.memory.node_id().clone()
    }

    async fn pull_changes(&self, since: u64) -> Result<ChangeSet, PeerError> {
        Ok(self.memory.changes_since(since))
    }

    async fn push_changes(&self, from: NodeId, changes: ChangeSet) -> Result<Vec<MemoryKey>, PeerError> {
        self.memory
            .apply_remote(&from, changes)
            .await
            .map(|outcome| outcome.conflicts)
            .map_err(|e| PeerError::Rejected {
                peer: self.node_id(),
                reason: e.to_string(),
            })
    }
}

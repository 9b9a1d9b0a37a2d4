// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! State machine feeding committed strong-namespace writes into a
//! [`MemorySynchronizer`].

use crate::application::memory_service::{MemoryCommand, MemorySynchronizer};
use crate::domain::memory::MemoryEntry;
use aegis_core::{LogIndex, StateMachine};
use std::sync::Arc;
use tracing::warn;

pub struct MemoryStateMachine {
    memory: Arc<MemorySynchronizer>,
}

impl MemoryStateMachine {
    pub fn new(memory: Arc<MemorySynchronizer>) -> Self {
        Self { memory }
    }
}

impl StateMachine for MemoryStateMachine {
    /// Returns the applied entry's id as raw UUID bytes, or nothing for an
    /// undecodable command.
    fn apply(&mut self, index: LogIndex, command: &[u8]) -> Vec<u8> {
        match serde_json::from_slice::<MemoryCommand>(command) {
            Ok(MemoryCommand::Put(entry)) => {
                let id = entry.id;
                self.memory.apply_committed(entry);
                id.0.as_bytes().to_vec()
            }
            Err(e) => {
                warn!(log_index = index, error = %e, "Skipping undecodable memory command");
                Vec::new()
            }
        }
    }

    fn snapshot(&self) -> Vec<u8> {
        match serde_json::to_vec(&self.memory.strong_entries()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize memory snapshot");
                Vec::new()
            }
        }
    }

    fn restore(&mut self, snapshot: &[u8]) {
        match serde_json::from_slice::<Vec<MemoryEntry>>(snapshot) {
            Ok(entries) => self.memory.restore_strong(entries),
            Err(e) => warn!(error = %e, "Ignoring undecodable memory snapshot"),
        }
    }
}

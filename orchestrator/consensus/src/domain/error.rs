// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use aegis_core::{LogIndex, NodeId, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Refusing to truncate committed entry {index} (commit index {commit_index})")]
    CommittedTruncation {
        index: LogIndex,
        commit_index: LogIndex,
    },

    #[error("Refusing to compact uncommitted entry {index} (commit index {commit_index})")]
    UncommittedCompaction {
        index: LogIndex,
        commit_index: LogIndex,
    },

    #[error("Log gap: expected entry {expected}, received {actual}")]
    LogGap { expected: LogIndex, actual: LogIndex },

    #[error("Not the leader (known leader: {leader:?})")]
    NotLeader { leader: Option<NodeId> },

    #[error("Invalid cluster configuration: {0}")]
    InvalidConfig(String),

    #[error("Log storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(String),
}

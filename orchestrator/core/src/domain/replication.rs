// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Replication Contract
//!
//! The seam between the replicated log and the components that need cluster
//! agreement. The consensus crate implements [`CommandProposer`] and drives a
//! [`StateMachine`]; the cortex (strongly-consistent namespaces) and the swarm
//! (consensus-backed assignment) only ever see these traits.
//!
//! ## Guarantees
//!
//! - `apply` is called for committed entries only, once per entry, in log order.
//! - A `propose` that returns `Ok(index)` means the command is committed at
//!   `index`. `NotCommitted` means the caller must not assume success.

use crate::domain::retry::Transient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Term = u64;
pub type LogIndex = u64;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalError {
    #[error("No leader is currently known")]
    NoLeader,

    #[error("Proposal was not committed: {0}")]
    NotCommitted(String),

    #[error("Consensus node is shut down")]
    Shutdown,

    #[error("Proposal rejected: {0}")]
    Rejected(String),
}

impl Transient for ProposalError {
    fn is_transient(&self) -> bool {
        matches!(self, ProposalError::NoLeader | ProposalError::NotCommitted(_))
    }
}

/// Deterministic state machine fed by committed log entries.
pub trait StateMachine: Send + Sync {
    /// Apply a committed command. The return value is handed back to the
    /// proposer on the node that accepted the proposal.
    fn apply(&mut self, index: LogIndex, command: &[u8]) -> Vec<u8>;

    /// Serialize the full state as of the last applied entry.
    fn snapshot(&self) -> Vec<u8>;

    /// Replace the full state from a snapshot produced by [`snapshot`](Self::snapshot).
    fn restore(&mut self, snapshot: &[u8]);
}

/// Submits commands for cluster-wide agreement.
#[async_trait]
pub trait CommandProposer: Send + Sync {
    async fn propose(&self, command: Vec<u8>) -> Result<LogIndex, ProposalError>;
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::agent::AgentState;
use aegis_core::{AgentId, ProposalError, StorageError, TaskId, Transient};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("swarm is at capacity ({max_agents} agents)")]
    CapacityExceeded { max_agents: usize },

    #[error("no eligible agent for task {task_id}: {reason}")]
    NoEligibleAgents { task_id: TaskId, reason: String },

    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task already submitted: {0}")]
    DuplicateTask(TaskId),

    #[error("agent {agent_id} cannot move from {from} to {to}")]
    InvalidTransition {
        agent_id: AgentId,
        from: AgentState,
        to: AgentState,
    },

    #[error("no handler registered for agent kind '{0}'")]
    NoHandler(String),

    #[error("invalid agent spec: {0}")]
    InvalidSpec(String),

    #[error("consensus-backed assignment is enabled but no proposer is attached")]
    ConsensusUnavailable,

    #[error("assignment not committed: {0}")]
    Consensus(#[from] ProposalError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("swarm command encoding failed: {0}")]
    Codec(String),
}

impl Transient for SwarmError {
    fn is_transient(&self) -> bool {
        match self {
            SwarmError::NoEligibleAgents { .. } => true,
            SwarmError::Consensus(e) => e.is_transient(),
            SwarmError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}

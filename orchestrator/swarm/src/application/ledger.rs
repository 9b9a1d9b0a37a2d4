// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Assignment Ledger
//!
//! State machine for consensus-backed assignment. Every node applies the
//! same committed [`SwarmCommand`]s in log order, so every node agrees on
//! which agent holds which task and in what order each agent received them.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Cluster-wide record of committed assignments

use crate::domain::error::SwarmError;
use crate::domain::task::TaskAssignment;
use aegis_core::{AgentId, LogIndex, StateMachine, TaskId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Commands carried by the replicated log for the swarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwarmCommand {
    Assign(TaskAssignment),
    /// The task left its agent (completed, failed or reassigned)
    Release { task_id: TaskId },
}

impl SwarmCommand {
    pub fn encode(&self) -> Result<Vec<u8>, SwarmError> {
        bincode::serialize(self).map_err(|e| SwarmError::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SwarmError> {
        bincode::deserialize(bytes).map_err(|e| SwarmError::Codec(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerState {
    active: BTreeMap<TaskId, TaskAssignment>,
    /// Per agent, task ids in commit order
    by_agent: BTreeMap<AgentId, Vec<TaskId>>,
    last_applied: LogIndex,
}

impl LedgerState {
    fn release(&mut self, task_id: &TaskId) {
        let Some(previous) = self.active.remove(task_id) else {
            return;
        };
        if let Some(tasks) = self.by_agent.get_mut(&previous.agent_id) {
            tasks.retain(|id| id != task_id);
            if tasks.is_empty() {
                self.by_agent.remove(&previous.agent_id);
            }
        }
    }
}

/// Replicated assignment table. Clones share the same state, so a clone can
/// be handed to the consensus node while the original is kept for reads.
#[derive(Clone, Default)]
pub struct AssignmentLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl AssignmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assignment(&self, task_id: &TaskId) -> Option<TaskAssignment> {
        self.state.read().active.get(task_id).cloned()
    }

    /// Tasks held by `agent_id`, in the order their assignments committed.
    pub fn assignments_for(&self, agent_id: &AgentId) -> Vec<TaskAssignment> {
        let state = self.state.read();
        state
            .by_agent
            .get(agent_id)
            .into_iter()
            .flatten()
            .filter_map(|task_id| state.active.get(task_id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_applied(&self) -> LogIndex {
        self.state.read().last_applied
    }
}

impl StateMachine for AssignmentLedger {
    fn apply(&mut self, index: LogIndex, command: &[u8]) -> Vec<u8> {
        let mut state = self.state.write();
        state.last_applied = index;
        match SwarmCommand::decode(command) {
            Ok(SwarmCommand::Assign(mut assignment)) => {
                assignment.log_index = Some(index);
                // a re-proposed assignment replaces the earlier one
                state.release(&assignment.task_id);
                state
                    .by_agent
                    .entry(assignment.agent_id)
                    .or_default()
                    .push(assignment.task_id);
                debug!(
                    task_id = %assignment.task_id,
                    agent_id = %assignment.agent_id,
                    log_index = index,
                    "Applied task assignment"
                );
                state.active.insert(assignment.task_id, assignment);
            }
            Ok(SwarmCommand::Release { task_id }) => state.release(&task_id),
            Err(e) => warn!(log_index = index, error = %e, "Skipping undecodable swarm command"),
        }
        Vec::new()
    }

    fn snapshot(&self) -> Vec<u8> {
        match bincode::serialize(&*self.state.read()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize assignment ledger");
                Vec::new()
            }
        }
    }

    fn restore(&mut self, snapshot: &[u8]) {
        match bincode::deserialize::<LedgerState>(snapshot) {
            Ok(restored) => *self.state.write() = restored,
            Err(e) => warn!(error = %e, "Ignoring undecodable assignment ledger snapshot"),
        }
    }
}

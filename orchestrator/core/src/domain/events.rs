// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::ids::{AgentId, NodeId, TaskId};
use crate::domain::replication::{LogIndex, Term};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentLifecycleEvent {
    AgentSpawned {
        agent_id: AgentId,
        kind: String,
        spawned_at: DateTime<Utc>,
    },
    AgentStateChanged {
        agent_id: AgentId,
        from: String,
        to: String,
        changed_at: DateTime<Utc>,
    },
    AgentReaped {
        agent_id: AgentId,
        reason: String,
        reaped_at: DateTime<Utc>,
    },
    AgentDespawned {
        agent_id: AgentId,
        despawned_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    TaskAssigned {
        task_id: TaskId,
        agent_id: AgentId,
        retry_count: u32,
        assigned_at: DateTime<Utc>,
    },
    TaskQueued {
        task_id: TaskId,
        priority: i32,
        queued_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: TaskId,
        agent_id: AgentId,
        completed_at: DateTime<Utc>,
    },
    TaskFailed {
        task_id: TaskId,
        agent_id: AgentId,
        attempt: u32,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    TaskDeadLettered {
        task_id: TaskId,
        retry_attempts: u32,
        dead_lettered_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConsensusEvent {
    RoleChanged {
        node_id: NodeId,
        role: String,
        term: Term,
        changed_at: DateTime<Utc>,
    },
    LeaderElected {
        node_id: NodeId,
        term: Term,
        elected_at: DateTime<Utc>,
    },
    EntriesCommitted {
        node_id: NodeId,
        commit_index: LogIndex,
        committed_at: DateTime<Utc>,
    },
    SnapshotTaken {
        node_id: NodeId,
        last_included_index: LogIndex,
        taken_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MemoryEvent {
    EntryPromoted {
        namespace: String,
        key: String,
        promoted_at: DateTime<Utc>,
    },
    ConflictResolved {
        namespace: String,
        key: String,
        peer: NodeId,
        resolved_at: DateTime<Utc>,
    },
    SyncCompleted {
        node_id: NodeId,
        peers_synced: usize,
        peers_failed: usize,
        completed_at: DateTime<Utc>,
    },
    EntriesExpired {
        count: usize,
        expired_at: DateTime<Utc>,
    },
}

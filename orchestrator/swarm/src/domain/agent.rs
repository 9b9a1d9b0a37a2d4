// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agents
//!
//! A swarm agent and its lifecycle.
//!
//! ```text
//! Initializing ──► Ready ◄──► Busy
//!                    │  ▲       │
//!                    ▼  │       │
//!                  Unhealthy ◄──┘
//!
//! any state ──► Terminated
//! ```
//!
//! An agent is `Ready` while it has spare task capacity and `Busy` once
//! `max_concurrent_tasks` assignments are in flight. `Unhealthy` agents keep
//! their in-flight tasks but receive no new ones.

use crate::domain::error::SwarmError;
use aegis_core::{AgentId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    Initializing,
    Ready,
    Busy,
    Unhealthy,
    Terminated,
}

impl AgentState {
    pub fn can_transition_to(self, to: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, to),
            (Initializing, Ready)
                | (Ready, Busy)
                | (Busy, Ready)
                | (Ready, Unhealthy)
                | (Busy, Unhealthy)
                | (Unhealthy, Ready)
                | (Unhealthy, Busy)
                | (Initializing | Ready | Busy | Unhealthy, Terminated)
        )
    }

    /// Whether the agent is expected to send heartbeats.
    pub fn is_live(self) -> bool {
        matches!(self, AgentState::Ready | AgentState::Busy)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Initializing => "initializing",
            AgentState::Ready => "ready",
            AgentState::Busy => "busy",
            AgentState::Unhealthy => "unhealthy",
            AgentState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What a caller asks for when spawning an agent.
///
/// `kind` selects the task handler; `capabilities` are the tags matched
/// against a task's required capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub kind: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Relative share under weighted-random selection
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Falls back to the swarm default when absent
    #[serde(default)]
    pub max_concurrent_tasks: Option<usize>,
}

fn default_weight() -> u32 {
    1
}

impl AgentSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            capabilities: BTreeSet::new(),
            labels: BTreeMap::new(),
            weight: default_weight(),
            max_concurrent_tasks: None,
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = Some(max);
        self
    }

    pub fn validate(&self) -> Result<(), SwarmError> {
        if self.kind.trim().is_empty() {
            return Err(SwarmError::InvalidSpec("kind cannot be empty".to_string()));
        }
        if self.weight == 0 {
            return Err(SwarmError::InvalidSpec("weight must be positive".to_string()));
        }
        if self.max_concurrent_tasks == Some(0) {
            return Err(SwarmError::InvalidSpec(
                "max_concurrent_tasks must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_assigned: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub kind: String,
    pub state: AgentState,
    pub capabilities: BTreeSet<String>,
    pub labels: BTreeMap<String, String>,
    pub weight: u32,
    pub max_concurrent_tasks: usize,
    /// Tasks currently assigned, in assignment order
    pub in_flight: Vec<TaskId>,
    pub metrics: AgentMetrics,
    /// Position in spawn order; used for rotation and tie-breaking
    pub spawn_seq: u64,
    pub spawned_at: DateTime<Utc>,
    pub last_heartbeat: Instant,
    pub unhealthy_since: Option<Instant>,
}

impl Agent {
    pub fn new(spec: AgentSpec, default_max_concurrent: usize, spawn_seq: u64, now: Instant) -> Self {
        Self {
            id: AgentId::new(),
            max_concurrent_tasks: spec.max_concurrent_tasks.unwrap_or(default_max_concurrent),
            kind: spec.kind,
            state: AgentState::Initializing,
            capabilities: spec.capabilities,
            labels: spec.labels,
            weight: spec.weight,
            in_flight: Vec::new(),
            metrics: AgentMetrics::default(),
            spawn_seq,
            spawned_at: Utc::now(),
            last_heartbeat: now,
            unhealthy_since: None,
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn load(&self) -> usize {
        self.in_flight.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.in_flight.len() < self.max_concurrent_tasks
    }

    /// Move to `to`, returning the previous state.
    pub fn transition(&mut self, to: AgentState) -> Result<AgentState, SwarmError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(SwarmError::InvalidTransition {
                agent_id: self.id,
                from,
                to,
            });
        }
        self.state = to;
        self.unhealthy_since = None;
        Ok(from)
    }

    /// The state a healthy agent should be in given its current load.
    pub fn load_state(&self) -> AgentState {
        if self.has_capacity() {
            AgentState::Ready
        } else {
            AgentState::Busy
        }
    }

    pub fn assign(&mut self, task_id: TaskId) {
        self.in_flight.push(task_id);
        self.metrics.tasks_assigned += 1;
    }

    /// Drop `task_id` from the in-flight list. Returns `false` if it was not there.
    pub fn release(&mut self, task_id: &TaskId) -> bool {
        let before = self.in_flight.len();
        self.in_flight.retain(|id| id != task_id);
        self.in_flight.len() != before
    }
}

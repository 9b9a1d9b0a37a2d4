// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tasks
//!
//! Units of work, their placement constraints and the records kept while
//! they are assigned, retried or dead-lettered.

use crate::domain::agent::{Agent, AgentState};
use aegis_core::{AgentId, LogIndex, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placement constraint on top of the capability requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affinity {
    /// Only this agent may run the task
    Agent(AgentId),
    /// Only agents of this kind
    Kind(String),
    /// Only agents carrying `key = value`
    Label { key: String, value: String },
    /// Any agent except this one
    AvoidAgent(AgentId),
}

impl Affinity {
    pub fn satisfied_by(&self, agent: &Agent) -> bool {
        match self {
            Affinity::Agent(id) => agent.id == *id,
            Affinity::Kind(kind) => agent.kind == *kind,
            Affinity::Label { key, value } => agent.labels.get(key) == Some(value),
            Affinity::AvoidAgent(id) => agent.id != *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub required_capability: Option<String>,
    pub affinity: Option<Affinity>,
    /// Higher runs first
    pub priority: i32,
    pub payload: Vec<u8>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Task {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: TaskId::new(),
            required_capability: None,
            affinity: None,
            priority: 0,
            payload: payload.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            max_retries: Self::DEFAULT_MAX_RETRIES,
        }
    }

    pub fn requiring(mut self, capability: impl Into<String>) -> Self {
        self.required_capability = Some(capability.into());
        self
    }

    pub fn with_affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = Some(affinity);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Ready, with spare capacity, carrying the required capability and
    /// satisfying the affinity.
    pub fn is_eligible(&self, agent: &Agent) -> bool {
        agent.state == AgentState::Ready
            && agent.has_capacity()
            && self
                .required_capability
                .as_deref()
                .is_none_or(|capability| agent.has_capability(capability))
            && self
                .affinity
                .as_ref()
                .is_none_or(|affinity| affinity.satisfied_by(agent))
    }

    /// Why no agent in `agents` can take this task right now.
    pub fn ineligibility_reason<'a>(&self, agents: impl IntoIterator<Item = &'a Agent>) -> String {
        let mut total = 0;
        let mut capable = 0;
        let mut placeable = 0;
        for agent in agents {
            total += 1;
            let has = self
                .required_capability
                .as_deref()
                .is_none_or(|capability| agent.has_capability(capability));
            if !has {
                continue;
            }
            capable += 1;
            if self.affinity.as_ref().is_none_or(|a| a.satisfied_by(agent)) {
                placeable += 1;
            }
        }

        if total == 0 {
            "swarm has no agents".to_string()
        } else if capable == 0 {
            format!(
                "no agent has capability '{}'",
                self.required_capability.as_deref().unwrap_or_default()
            )
        } else if placeable == 0 {
            "no capable agent satisfies the task affinity".to_string()
        } else {
            format!("all {placeable} matching agents are busy, unhealthy or initializing")
        }
    }
}

/// A task bound to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    /// Retries consumed before this assignment; zero on first delivery
    pub retry_count: u32,
    pub assigned_at: DateTime<Utc>,
    /// Log position of the committed assignment in consensus-backed mode
    pub log_index: Option<LogIndex>,
}

/// Result of submitting a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Assigned(TaskAssignment),
    Queued { task_id: TaskId, reason: String },
}

impl Distribution {
    pub fn task_id(&self) -> TaskId {
        match self {
            Distribution::Assigned(assignment) => assignment.task_id,
            Distribution::Queued { task_id, .. } => *task_id,
        }
    }

    pub fn assignment(&self) -> Option<&TaskAssignment> {
        match self {
            Distribution::Assigned(assignment) => Some(assignment),
            Distribution::Queued { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// 1-based execution attempt that failed
    pub attempt: u32,
    pub agent_id: AgentId,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// A task that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task: Task,
    /// Retries that were actually scheduled
    pub retry_attempts: u32,
    /// Every failed attempt, oldest first
    pub failures: Vec<FailureRecord>,
    pub dead_lettered_at: DateTime<Utc>,
}

/// What happened to a failed task.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Retry number `retry` runs once `delay` has passed
    Retrying { retry: u32, delay: Duration },
    DeadLettered(DeadLetter),
}

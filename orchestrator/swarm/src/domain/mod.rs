// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Agents, tasks and the rules for placing one on the other.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Agent lifecycle, eligibility, selection, queueing and topology

pub mod agent;
pub mod error;
pub mod handler;
pub mod queue;
pub mod selection;
pub mod task;
pub mod topology;

pub use agent::{Agent, AgentMetrics, AgentSpec, AgentState};
pub use error::SwarmError;
pub use handler::{TaskContext, TaskHandler};
pub use queue::{QueuedTask, TaskQueue};
pub use selection::AgentSelector;
pub use task::{
    Affinity, DeadLetter, Distribution, FailOutcome, FailureRecord, Task, TaskAssignment,
};
pub use topology::neighbors;

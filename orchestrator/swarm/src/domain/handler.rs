// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task handlers.
//!
//! Agent kinds are open-ended: behaviour is attached by registering a
//! [`TaskHandler`] for a kind in the
//! [`HandlerRegistry`](crate::infrastructure::HandlerRegistry).

use aegis_core::{AgentId, TaskId};
use async_trait::async_trait;

/// Everything a handler sees of one execution attempt.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub kind: String,
    pub payload: Vec<u8>,
    /// 1-based execution attempt
    pub attempt: u32,
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task. An error is recorded as a failed attempt.
    async fn handle(&self, context: TaskContext) -> anyhow::Result<Vec<u8>>;
}

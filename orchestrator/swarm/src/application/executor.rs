// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task Executor
//!
//! Runs delivered assignments through the handler registered for the
//! assignee's kind and reports the result back to the orchestrator.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Bounded-time execution of assigned tasks
//!
//! A handler error, a missing handler and a timeout are all failed
//! attempts; the orchestrator decides between retry and dead letter.

use crate::application::orchestrator::SwarmOrchestrator;
use crate::domain::error::SwarmError;
use crate::domain::handler::TaskContext;
use crate::domain::task::{FailOutcome, TaskAssignment};
use crate::infrastructure::handler_registry::HandlerRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed { output: Vec<u8> },
    Failed(FailOutcome),
}

pub struct TaskExecutor {
    orchestrator: Arc<SwarmOrchestrator>,
    handlers: Arc<HandlerRegistry>,
    shutdown_token: CancellationToken,
}

impl TaskExecutor {
    pub fn new(orchestrator: Arc<SwarmOrchestrator>, handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            orchestrator,
            handlers,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Execute one assignment to completion or failure.
    pub async fn execute(&self, assignment: &TaskAssignment) -> Result<ExecutionOutcome, SwarmError> {
        let task_id = assignment.task_id;
        let task = self
            .orchestrator
            .task(&task_id)
            .ok_or(SwarmError::TaskNotFound(task_id))?;
        let agent = self
            .orchestrator
            .agent(&assignment.agent_id)
            .ok_or(SwarmError::AgentNotFound(assignment.agent_id))?;

        let context = TaskContext {
            task_id,
            agent_id: agent.id,
            kind: agent.kind.clone(),
            payload: task.payload.clone(),
            attempt: assignment.retry_count + 1,
        };
        debug!(task_id = %task_id, agent_id = %agent.id, attempt = context.attempt, "Executing task");

        let result = match self.handlers.resolve(&agent.kind) {
            Ok(handler) => match tokio::time::timeout(task.timeout, handler.handle(context)).await {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(format!("handler error: {e:#}")),
                Err(_) => Err(format!("timed out after {:?}", task.timeout)),
            },
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(output) => {
                self.orchestrator.complete(&task_id).await?;
                Ok(ExecutionOutcome::Completed { output })
            }
            Err(reason) => {
                let outcome = self.orchestrator.fail(&task_id, reason).await?;
                Ok(ExecutionOutcome::Failed(outcome))
            }
        }
    }

    /// Execute every delivered assignment until shutdown. Assignments run
    /// concurrently; delivery order is preserved in the order they start.
    pub fn start(
        self: Arc<Self>,
        mut deliveries: mpsc::UnboundedReceiver<TaskAssignment>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Starting task executor");
            let mut running = JoinSet::new();
            loop {
                tokio::select! {
                    delivered = deliveries.recv() => {
                        let Some(assignment) = delivered else {
                            break;
                        };
                        let executor = self.clone();
                        running.spawn(async move {
                            if let Err(e) = executor.execute(&assignment).await {
                                warn!(task_id = %assignment.task_id, error = %e, "Task execution aborted");
                            }
                        });
                    }
                    Some(_) = running.join_next(), if !running.is_empty() => {}
                    _ = self.shutdown_token.cancelled() => {
                        info!("Shutdown signal received, stopping task executor");
                        break;
                    }
                }
            }
            running.abort_all();
            info!("Task executor stopped");
        })
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm Orchestrator
//!
//! Owns the agents of one node, places tasks on them and keeps every task
//! accounted for until it completes or is dead-lettered.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Agent lifecycle, task distribution, retry and queueing
//!
//! # Task Flow
//!
//! ```text
//! distribute ──► eligible agent? ──yes──► assigned ──► complete
//!                    │                       │
//!                    no                    fail ──► retries left? ──no──► dead letter
//!                    ▼                                   │
//!                  queue ◄── no agent ◄── due ◄── yes: backoff delay
//! ```
//!
//! Agents and tasks never point at each other. In-flight tasks live in an
//! assignment table keyed by task id and each agent lists the task ids it
//! holds.
//!
//! In consensus-backed mode an assignment is reserved locally, proposed as
//! [`SwarmCommand::Assign`] and only becomes visible (and delivered) once
//! committed. A proposal that fails releases the reservation.

use crate::application::ledger::SwarmCommand;
use crate::domain::agent::{Agent, AgentSpec, AgentState};
use crate::domain::error::SwarmError;
use crate::domain::queue::{QueuedTask, TaskQueue};
use crate::domain::selection::AgentSelector;
use crate::domain::task::{
    DeadLetter, Distribution, FailOutcome, FailureRecord, Task, TaskAssignment,
};
use crate::domain::topology;
use crate::infrastructure::queue_store::QueueStore;
use aegis_core::domain::events::{AgentLifecycleEvent, TaskEvent};
use aegis_core::domain::metrics::MeshMetrics;
use aegis_core::domain::node_config::{QueuePersistence, SwarmConfig};
use aegis_core::infrastructure::EventBus;
use aegis_core::{AgentId, CommandProposer, KeyValueStore, NodeId, TaskId};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

struct ActiveTask {
    task: Task,
    assignment: TaskAssignment,
    failures: Vec<FailureRecord>,
    /// False while a consensus-backed assignment awaits commit
    confirmed: bool,
}

struct DelayedRetry {
    queued: QueuedTask,
    due_at: Instant,
}

struct SwarmState {
    agents: BTreeMap<AgentId, Agent>,
    next_spawn_seq: u64,
    active: HashMap<TaskId, ActiveTask>,
    queue: TaskQueue,
    delayed: HashMap<TaskId, DelayedRetry>,
    dead_letters: Vec<DeadLetter>,
    selector: AgentSelector,
}

impl SwarmState {
    fn knows(&self, task_id: &TaskId) -> bool {
        self.active.contains_key(task_id)
            || self.delayed.contains_key(task_id)
            || self.queue.contains(task_id)
    }

    /// Everything that must survive a restart when the queue is durable.
    /// Tasks waiting out a retry delay are included and come back as queued.
    fn pending(&self) -> Vec<QueuedTask> {
        let mut pending = self.queue.to_vec();
        let mut delayed: Vec<&DelayedRetry> = self.delayed.values().collect();
        delayed.sort_by_key(|d| d.due_at);
        pending.extend(delayed.into_iter().map(|d| d.queued.clone()));
        pending
    }
}

fn in_spawn_order(agents: &BTreeMap<AgentId, Agent>) -> Vec<&Agent> {
    let mut ordered: Vec<&Agent> = agents.values().collect();
    ordered.sort_by_key(|agent| agent.spawn_seq);
    ordered
}

/// What one health check changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthReport {
    pub unhealthy: Vec<AgentId>,
    pub reaped: Vec<AgentId>,
    /// In-flight tasks of reaped agents, failed through the retry policy
    pub failed_tasks: Vec<(TaskId, FailOutcome)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwarmStats {
    pub agents: usize,
    pub initializing: usize,
    pub ready: usize,
    pub busy: usize,
    pub unhealthy: usize,
    pub in_flight: usize,
    pub queued: usize,
    pub awaiting_retry: usize,
    pub dead_lettered: usize,
}

pub struct SwarmOrchestrator {
    node_id: NodeId,
    config: SwarmConfig,
    state: Mutex<SwarmState>,
    queue_store: Option<QueueStore>,
    proposer: RwLock<Option<Arc<dyn CommandProposer>>>,
    deliveries: Mutex<Option<mpsc::UnboundedSender<TaskAssignment>>>,
    event_bus: Option<EventBus>,
    metrics: Arc<MeshMetrics>,
}

impl SwarmOrchestrator {
    pub fn new(node_id: NodeId, config: SwarmConfig) -> Self {
        let selector = AgentSelector::new(config.selection_policy);
        Self {
            node_id,
            state: Mutex::new(SwarmState {
                agents: BTreeMap::new(),
                next_spawn_seq: 0,
                active: HashMap::new(),
                queue: TaskQueue::new(),
                delayed: HashMap::new(),
                dead_letters: Vec::new(),
                selector,
            }),
            config,
            queue_store: None,
            proposer: RwLock::new(None),
            deliveries: Mutex::new(None),
            event_bus: None,
            metrics: Arc::new(MeshMetrics::new()),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MeshMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Backing store for `queue_persistence: durable`. Ignored for memory queues.
    pub fn with_queue_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        if self.config.queue_persistence == QueuePersistence::Durable {
            self.queue_store = Some(QueueStore::new(store));
        } else {
            debug!("Queue persistence is memory; ignoring queue store");
        }
        self
    }

    /// Make weighted-random selection reproducible.
    pub fn with_selection_seed(self, seed: u64) -> Self {
        self.state.lock().selector = AgentSelector::with_seed(self.config.selection_policy, seed);
        self
    }

    /// Proposer for consensus-backed assignment.
    ///
    /// Set after construction because the proposer's state machine is
    /// usually built alongside this orchestrator.
    pub fn set_proposer(&self, proposer: Arc<dyn CommandProposer>) {
        *self.proposer.write() = Some(proposer);
    }

    /// Channel on which every assignment is delivered once it is
    /// authoritative. A second call replaces the previous receiver.
    pub fn deliveries(&self) -> mpsc::UnboundedReceiver<TaskAssignment> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.deliveries.lock() = Some(sender);
        receiver
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<MeshMetrics> {
        self.metrics.clone()
    }

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    /// Register a new agent in `Initializing`. Its first heartbeat makes it
    /// `Ready`.
    pub fn spawn(&self, spec: AgentSpec) -> Result<AgentId, SwarmError> {
        spec.validate()?;
        let mut state = self.state.lock();
        if state.agents.len() >= self.config.max_agents {
            warn!(
                max_agents = self.config.max_agents,
                kind = %spec.kind,
                "Rejected agent spawn: swarm at capacity"
            );
            return Err(SwarmError::CapacityExceeded {
                max_agents: self.config.max_agents,
            });
        }

        let seq = state.next_spawn_seq;
        state.next_spawn_seq += 1;
        let agent = Agent::new(
            spec,
            self.config.default_max_concurrent_tasks,
            seq,
            Instant::now(),
        );
        let agent_id = agent.id;
        info!(agent_id = %agent_id, kind = %agent.kind, "Spawned agent");
        self.publish_agent(AgentLifecycleEvent::AgentSpawned {
            agent_id,
            kind: agent.kind.clone(),
            spawned_at: agent.spawned_at,
        });
        state.agents.insert(agent_id, agent);
        self.record_gauges(&state);
        Ok(agent_id)
    }

    /// Terminate an agent. Its in-flight tasks are placed again without
    /// consuming a retry; their ids are returned.
    pub async fn despawn(&self, agent_id: &AgentId) -> Result<Vec<TaskId>, SwarmError> {
        let orphaned = {
            let mut state = self.state.lock();
            let mut agent = state
                .agents
                .remove(agent_id)
                .ok_or(SwarmError::AgentNotFound(*agent_id))?;
            let from = agent.transition(AgentState::Terminated)?;
            self.publish_state_change(*agent_id, from, AgentState::Terminated);

            let orphaned: Vec<QueuedTask> = agent
                .in_flight
                .iter()
                .filter_map(|task_id| state.active.remove(task_id))
                .map(|active| QueuedTask {
                    task: active.task,
                    retry_count: active.assignment.retry_count,
                    failures: active.failures,
                    enqueued_at: Utc::now(),
                })
                .collect();
            info!(agent_id = %agent_id, orphaned = orphaned.len(), "Despawned agent");
            self.publish_agent(AgentLifecycleEvent::AgentDespawned {
                agent_id: *agent_id,
                despawned_at: Utc::now(),
            });
            self.record_gauges(&state);
            orphaned
        };

        let mut moved = Vec::with_capacity(orphaned.len());
        for queued in orphaned {
            let task_id = queued.task.id;
            self.release_in_ledger(task_id).await;
            if let Err(e) = self.place(queued, false).await {
                warn!(task_id = %task_id, error = %e, "Could not place task of despawned agent");
            }
            moved.push(task_id);
        }
        Ok(moved)
    }

    /// Record a heartbeat. An initializing or unhealthy agent becomes
    /// available again and the queue is drained towards it. Returns the
    /// agent's state afterwards.
    pub async fn heartbeat(&self, agent_id: &AgentId) -> Result<AgentState, SwarmError> {
        let (state_now, available) = {
            let mut state = self.state.lock();
            let agent = state
                .agents
                .get_mut(agent_id)
                .ok_or(SwarmError::AgentNotFound(*agent_id))?;
            agent.last_heartbeat = Instant::now();
            let available = match agent.state {
                AgentState::Initializing | AgentState::Unhealthy => {
                    let to = agent.load_state();
                    let from = agent.transition(to)?;
                    self.publish_state_change(*agent_id, from, to);
                    if from == AgentState::Unhealthy {
                        info!(agent_id = %agent_id, "Agent recovered");
                    }
                    to == AgentState::Ready
                }
                _ => false,
            };
            let current = agent.state;
            self.record_gauges(&state);
            (current, available)
        };

        if !available {
            return Ok(state_now);
        }
        self.drain_logged().await;
        Ok(self.agent(agent_id).map_or(state_now, |agent| agent.state))
    }

    /// Mark agents that missed too many heartbeats as unhealthy and reap
    /// agents that stayed unhealthy past the grace period.
    pub async fn check_health(&self, now: Instant) -> Result<HealthReport, SwarmError> {
        let threshold = self
            .config
            .heartbeat_interval
            .saturating_mul(self.config.unhealthy_after_missed);
        let mut report = HealthReport::default();

        {
            let mut state = self.state.lock();
            let ids: Vec<AgentId> = in_spawn_order(&state.agents).iter().map(|a| a.id).collect();

            for agent_id in ids {
                let Some(agent) = state.agents.get_mut(&agent_id) else {
                    continue;
                };
                if agent.state.is_live()
                    && now.saturating_duration_since(agent.last_heartbeat) > threshold
                {
                    let from = agent.transition(AgentState::Unhealthy)?;
                    agent.unhealthy_since = Some(now);
                    warn!(
                        agent_id = %agent_id,
                        silent_for = ?now.saturating_duration_since(agent.last_heartbeat),
                        "Agent missed heartbeats; marked unhealthy"
                    );
                    self.publish_state_change(agent_id, from, AgentState::Unhealthy);
                    report.unhealthy.push(agent_id);
                } else if agent.state == AgentState::Unhealthy
                    && agent
                        .unhealthy_since
                        .is_some_and(|since| now.saturating_duration_since(since) >= self.config.reap_after)
                {
                    report.reaped.push(agent_id);
                }
            }

            for agent_id in &report.reaped {
                let Some(mut agent) = state.agents.remove(agent_id) else {
                    continue;
                };
                let from = agent.transition(AgentState::Terminated)?;
                self.publish_state_change(*agent_id, from, AgentState::Terminated);
                let reason = format!("agent {agent_id} reaped after missing heartbeats");
                warn!(agent_id = %agent_id, in_flight = agent.in_flight.len(), "Reaped unhealthy agent");
                self.publish_agent(AgentLifecycleEvent::AgentReaped {
                    agent_id: *agent_id,
                    reason: "unhealthy past grace period".to_string(),
                    reaped_at: Utc::now(),
                });

                for task_id in &agent.in_flight {
                    if let Some(active) = state.active.remove(task_id) {
                        let outcome = self.record_failure(&mut state, active, reason.clone(), now);
                        report.failed_tasks.push((*task_id, outcome));
                    }
                }
            }

            if !report.failed_tasks.is_empty() {
                self.persist_logged(&state);
            }
            self.record_gauges(&state);
        }

        for (task_id, _) in &report.failed_tasks {
            self.release_in_ledger(*task_id).await;
        }
        Ok(report)
    }

    pub fn agent(&self, agent_id: &AgentId) -> Option<Agent> {
        self.state.lock().agents.get(agent_id).cloned()
    }

    /// Every live agent, in spawn order.
    pub fn agents(&self) -> Vec<Agent> {
        let state = self.state.lock();
        in_spawn_order(&state.agents).into_iter().cloned().collect()
    }

    /// Coordination neighbours of `agent_id` under the configured topology.
    pub fn neighbors(&self, agent_id: &AgentId) -> Result<Vec<AgentId>, SwarmError> {
        let state = self.state.lock();
        if !state.agents.contains_key(agent_id) {
            return Err(SwarmError::AgentNotFound(*agent_id));
        }
        let members: Vec<AgentId> = in_spawn_order(&state.agents).iter().map(|a| a.id).collect();
        Ok(topology::neighbors(self.config.topology, &members, agent_id))
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Assign `task` to an eligible agent, or queue it when none is
    /// available and queueing is enabled.
    pub async fn distribute(&self, task: Task) -> Result<Distribution, SwarmError> {
        if self.state.lock().knows(&task.id) {
            return Err(SwarmError::DuplicateTask(task.id));
        }
        self.place(QueuedTask::fresh(task), true).await
    }

    pub async fn complete(&self, task_id: &TaskId) -> Result<TaskAssignment, SwarmError> {
        let (assignment, agent_available) = {
            let mut state = self.state.lock();
            let active = self.take_confirmed(&mut state, task_id)?;
            let available = self.release_agent(&mut state, &active.assignment, true);
            self.record_gauges(&state);
            (active.assignment, available)
        };

        info!(task_id = %task_id, agent_id = %assignment.agent_id, "Task completed");
        self.metrics.task_completed();
        self.publish_task(TaskEvent::TaskCompleted {
            task_id: *task_id,
            agent_id: assignment.agent_id,
            completed_at: Utc::now(),
        });

        self.release_in_ledger(*task_id).await;
        if agent_available {
            self.drain_logged().await;
        }
        Ok(assignment)
    }

    /// Record a failed attempt. The task is retried after a backoff delay
    /// while it has retries left and dead-lettered otherwise.
    pub async fn fail(
        &self,
        task_id: &TaskId,
        reason: impl Into<String>,
    ) -> Result<FailOutcome, SwarmError> {
        let (outcome, agent_available) = {
            let mut state = self.state.lock();
            let active = self.take_confirmed(&mut state, task_id)?;
            let available = self.release_agent(&mut state, &active.assignment, false);
            let outcome = self.record_failure(&mut state, active, reason.into(), Instant::now());
            self.persist_logged(&state);
            self.record_gauges(&state);
            (outcome, available)
        };

        self.release_in_ledger(*task_id).await;
        if agent_available {
            self.drain_logged().await;
        }
        Ok(outcome)
    }

    /// Place every retry whose backoff delay has passed.
    pub async fn dispatch_due_retries(&self, now: Instant) -> Vec<Distribution> {
        let due: Vec<QueuedTask> = {
            let mut state = self.state.lock();
            let mut ready: Vec<(Instant, TaskId)> = state
                .delayed
                .iter()
                .filter(|(_, d)| d.due_at <= now)
                .map(|(id, d)| (d.due_at, *id))
                .collect();
            ready.sort();
            ready
                .into_iter()
                .filter_map(|(_, id)| state.delayed.remove(&id))
                .map(|d| d.queued)
                .collect()
        };

        let mut placed = Vec::with_capacity(due.len());
        for queued in due {
            let task_id = queued.task.id;
            match self.place(queued, false).await {
                Ok(distribution) => placed.push(distribution),
                Err(e) => warn!(task_id = %task_id, error = %e, "Retry could not be placed; queued"),
            }
        }
        placed
    }

    /// Dispatch one task's retry now, ignoring what is left of its delay.
    /// Returns where the task currently stands if it is not waiting.
    pub async fn dispatch_retry(&self, task_id: &TaskId) -> Result<Distribution, SwarmError> {
        let waiting = {
            let mut state = self.state.lock();
            match state.delayed.remove(task_id) {
                Some(delayed) => delayed.queued,
                None => {
                    if let Some(active) = state.active.get(task_id).filter(|a| a.confirmed) {
                        return Ok(Distribution::Assigned(active.assignment.clone()));
                    }
                    if state.queue.contains(task_id) {
                        return Ok(Distribution::Queued {
                            task_id: *task_id,
                            reason: "waiting in queue".to_string(),
                        });
                    }
                    return Err(SwarmError::TaskNotFound(*task_id));
                }
            }
        };
        self.place(waiting, false).await
    }

    /// Offer queued tasks, highest priority first, to every agent with
    /// spare capacity. Tasks no agent can take stay queued.
    pub async fn drain_queue(&self) -> Result<Vec<TaskAssignment>, SwarmError> {
        let mut assigned = Vec::new();
        loop {
            let reserved = {
                let mut state = self.state.lock();
                let SwarmState { queue, agents, .. } = &mut *state;
                let Some(queued) =
                    queue.take_first(|q| agents.values().any(|agent| q.task.is_eligible(agent)))
                else {
                    break;
                };
                self.persist_logged(&state);
                match self.reserve(&mut state, queued) {
                    Ok(assignment) => assignment,
                    Err((queued, _)) => {
                        state.queue.push(queued);
                        break;
                    }
                }
            };
            match self.confirm(reserved.clone()).await {
                Ok(assignment) => assigned.push(assignment),
                Err(e) => {
                    self.requeue_reserved(&reserved);
                    return Err(e);
                }
            }
        }
        if !assigned.is_empty() {
            debug!(assigned = assigned.len(), "Drained pending queue");
        }
        Ok(assigned)
    }

    /// Reload a durable queue after a restart. Returns the number of tasks
    /// restored; tasks already known to this orchestrator are skipped.
    pub fn restore_queue(&self) -> Result<usize, SwarmError> {
        let Some(store) = &self.queue_store else {
            return Ok(0);
        };
        let persisted = store.load()?;
        let mut state = self.state.lock();
        let mut restored = 0;
        for queued in persisted {
            if state.knows(&queued.task.id) {
                continue;
            }
            state.queue.push(queued);
            restored += 1;
        }
        info!(restored, "Restored pending queue");
        self.record_gauges(&state);
        Ok(restored)
    }

    /// The task behind an in-flight, queued or retrying id.
    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        let state = self.state.lock();
        if let Some(active) = state.active.get(task_id) {
            return Some(active.task.clone());
        }
        if let Some(delayed) = state.delayed.get(task_id) {
            return Some(delayed.queued.task.clone());
        }
        let queued = state
            .queue
            .iter()
            .find(|q| q.task.id == *task_id)
            .map(|q| q.task.clone());
        queued
    }

    /// Authoritative assignment of an in-flight task.
    pub fn assignment(&self, task_id: &TaskId) -> Option<TaskAssignment> {
        self.state
            .lock()
            .active
            .get(task_id)
            .filter(|active| active.confirmed)
            .map(|active| active.assignment.clone())
    }

    /// Tasks held by `agent_id`, in the order they were assigned.
    pub fn assignments_for(&self, agent_id: &AgentId) -> Vec<TaskAssignment> {
        let state = self.state.lock();
        state
            .agents
            .get(agent_id)
            .map(|agent| {
                agent
                    .in_flight
                    .iter()
                    .filter_map(|task_id| state.active.get(task_id))
                    .filter(|active| active.confirmed)
                    .map(|active| active.assignment.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Queued task ids in the order they will be offered.
    pub fn queued(&self) -> Vec<TaskId> {
        self.state.lock().queue.iter().map(|q| q.task.id).collect()
    }

    /// Earliest instant at which a pending retry becomes due.
    pub fn next_retry_due(&self) -> Option<Instant> {
        self.state.lock().delayed.values().map(|d| d.due_at).min()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().dead_letters.clone()
    }

    pub fn stats(&self) -> SwarmStats {
        let state = self.state.lock();
        let mut stats = SwarmStats {
            agents: state.agents.len(),
            in_flight: state.active.len(),
            queued: state.queue.len(),
            awaiting_retry: state.delayed.len(),
            dead_lettered: state.dead_letters.len(),
            ..SwarmStats::default()
        };
        for agent in state.agents.values() {
            match agent.state {
                AgentState::Initializing => stats.initializing += 1,
                AgentState::Ready => stats.ready += 1,
                AgentState::Busy => stats.busy += 1,
                AgentState::Unhealthy => stats.unhealthy += 1,
                AgentState::Terminated => {}
            }
        }
        stats
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Assign `queued` or queue it. A fresh task with nowhere to go is
    /// rejected when queueing is disabled; tasks that were already accepted
    /// are always queued so that none is lost.
    async fn place(&self, queued: QueuedTask, fresh: bool) -> Result<Distribution, SwarmError> {
        let reserved = {
            let mut state = self.state.lock();
            self.reserve(&mut state, queued)
        };

        match reserved {
            Ok(reserved) => match self.confirm(reserved.clone()).await {
                Ok(assignment) => Ok(Distribution::Assigned(assignment)),
                Err(e) => {
                    if fresh {
                        self.unreserve(&reserved);
                    } else {
                        self.requeue_reserved(&reserved);
                    }
                    Err(e)
                }
            },
            Err((queued, reason)) => {
                let task_id = queued.task.id;
                if fresh && !self.config.queueing_enabled {
                    warn!(task_id = %task_id, reason = %reason, "No eligible agent; task rejected");
                    return Err(SwarmError::NoEligibleAgents { task_id, reason });
                }
                self.enqueue(queued, &reason, fresh)?;
                Ok(Distribution::Queued { task_id, reason })
            }
        }
    }

    /// Bind `queued` to an agent chosen by the selection policy. Hands the
    /// task back with the reason when no agent is eligible.
    fn reserve(
        &self,
        state: &mut SwarmState,
        queued: QueuedTask,
    ) -> Result<TaskAssignment, (QueuedTask, String)> {
        let picked = {
            let candidates: Vec<&Agent> = in_spawn_order(&state.agents)
                .into_iter()
                .filter(|agent| queued.task.is_eligible(agent))
                .collect();
            state.selector.select(&candidates)
        };
        let Some(agent_id) = picked else {
            let reason = queued.task.ineligibility_reason(state.agents.values());
            return Err((queued, reason));
        };

        let task_id = queued.task.id;
        if let Some(agent) = state.agents.get_mut(&agent_id) {
            agent.assign(task_id);
            if !agent.has_capacity() {
                if let Ok(from) = agent.transition(AgentState::Busy) {
                    self.publish_state_change(agent_id, from, AgentState::Busy);
                }
            }
        }

        let assignment = TaskAssignment {
            task_id,
            agent_id,
            retry_count: queued.retry_count,
            assigned_at: Utc::now(),
            log_index: None,
        };
        state.active.insert(
            task_id,
            ActiveTask {
                task: queued.task,
                assignment: assignment.clone(),
                failures: queued.failures,
                confirmed: false,
            },
        );
        self.record_gauges(state);
        Ok(assignment)
    }

    /// Make a reservation authoritative: commit it through the replicated
    /// log when consensus-backed, then announce and deliver it.
    async fn confirm(&self, mut assignment: TaskAssignment) -> Result<TaskAssignment, SwarmError> {
        if self.config.consensus_backed {
            let proposer = self
                .proposer
                .read()
                .clone()
                .ok_or(SwarmError::ConsensusUnavailable)?;
            let command = SwarmCommand::Assign(assignment.clone()).encode()?;
            let index = proposer.propose(command).await?;
            assignment.log_index = Some(index);
        }

        {
            let mut state = self.state.lock();
            match state.active.get_mut(&assignment.task_id) {
                Some(active) if active.assignment.agent_id == assignment.agent_id => {
                    active.assignment = assignment.clone();
                    active.confirmed = true;
                }
                // the agent went away while the proposal was in flight and
                // the task has already been handled there
                _ => return Ok(assignment),
            }
        }

        info!(
            task_id = %assignment.task_id,
            agent_id = %assignment.agent_id,
            retry_count = assignment.retry_count,
            log_index = ?assignment.log_index,
            "Task assigned"
        );
        self.metrics.task_assigned();
        self.publish_task(TaskEvent::TaskAssigned {
            task_id: assignment.task_id,
            agent_id: assignment.agent_id,
            retry_count: assignment.retry_count,
            assigned_at: assignment.assigned_at,
        });
        if let Some(sender) = self.deliveries.lock().as_ref() {
            if sender.send(assignment.clone()).is_err() {
                debug!(task_id = %assignment.task_id, "No delivery receiver for assignment");
            }
        }
        Ok(assignment)
    }

    /// Drop an unconfirmed reservation and hand the task back. Does nothing
    /// if the task has meanwhile been placed elsewhere.
    fn unreserve(&self, reserved: &TaskAssignment) -> Option<QueuedTask> {
        let task_id = &reserved.task_id;
        let mut state = self.state.lock();
        match state.active.get(task_id) {
            Some(active) if !active.confirmed && active.assignment.agent_id == reserved.agent_id => {}
            _ => return None,
        }
        let active = state.active.remove(task_id)?;
        if let Some(agent) = state.agents.get_mut(&active.assignment.agent_id) {
            agent.release(task_id);
            agent.metrics.tasks_assigned = agent.metrics.tasks_assigned.saturating_sub(1);
            if agent.state == AgentState::Busy && agent.has_capacity() {
                if let Ok(from) = agent.transition(AgentState::Ready) {
                    self.publish_state_change(active.assignment.agent_id, from, AgentState::Ready);
                }
            }
        }
        self.record_gauges(&state);
        Some(QueuedTask {
            task: active.task,
            retry_count: active.assignment.retry_count,
            failures: active.failures,
            enqueued_at: Utc::now(),
        })
    }

    fn requeue_reserved(&self, reserved: &TaskAssignment) {
        if let Some(queued) = self.unreserve(reserved) {
            let reason = "assignment was not committed".to_string();
            if let Err(e) = self.enqueue(queued, &reason, false) {
                warn!(task_id = %reserved.task_id, error = %e, "Failed to requeue task");
            }
        }
    }

    fn enqueue(&self, queued: QueuedTask, reason: &str, fresh: bool) -> Result<(), SwarmError> {
        let task_id = queued.task.id;
        let priority = queued.task.priority;
        let mut state = self.state.lock();
        state.queue.push(queued);
        if let Err(e) = self.persist(&state) {
            if fresh {
                state.queue.remove(&task_id);
                return Err(e.into());
            }
            warn!(task_id = %task_id, error = %e, "Queued task could not be persisted");
        }

        info!(task_id = %task_id, priority, reason = %reason, queued = state.queue.len(), "Task queued");
        self.metrics.task_queued();
        self.publish_task(TaskEvent::TaskQueued {
            task_id,
            priority,
            queued_at: Utc::now(),
        });
        self.record_gauges(&state);
        Ok(())
    }

    fn take_confirmed(&self, state: &mut SwarmState, task_id: &TaskId) -> Result<ActiveTask, SwarmError> {
        match state.active.get(task_id) {
            Some(active) if active.confirmed => {}
            _ => return Err(SwarmError::TaskNotFound(*task_id)),
        }
        state
            .active
            .remove(task_id)
            .ok_or(SwarmError::TaskNotFound(*task_id))
    }

    /// Free the agent's slot. Returns whether the agent can take more work.
    fn release_agent(&self, state: &mut SwarmState, assignment: &TaskAssignment, succeeded: bool) -> bool {
        let Some(agent) = state.agents.get_mut(&assignment.agent_id) else {
            return false;
        };
        agent.release(&assignment.task_id);
        if succeeded {
            agent.metrics.tasks_completed += 1;
        } else {
            agent.metrics.tasks_failed += 1;
        }
        if agent.state == AgentState::Busy && agent.has_capacity() {
            if let Ok(from) = agent.transition(AgentState::Ready) {
                self.publish_state_change(assignment.agent_id, from, AgentState::Ready);
            }
        }
        agent.state == AgentState::Ready
    }

    fn record_failure(
        &self,
        state: &mut SwarmState,
        active: ActiveTask,
        reason: String,
        now: Instant,
    ) -> FailOutcome {
        let ActiveTask {
            task,
            assignment,
            mut failures,
            ..
        } = active;
        let attempt = assignment.retry_count + 1;
        failures.push(FailureRecord {
            attempt,
            agent_id: assignment.agent_id,
            reason: reason.clone(),
            failed_at: Utc::now(),
        });
        self.metrics.task_failed();
        self.publish_task(TaskEvent::TaskFailed {
            task_id: task.id,
            agent_id: assignment.agent_id,
            attempt,
            reason: reason.clone(),
            failed_at: Utc::now(),
        });

        if assignment.retry_count < task.max_retries {
            let retry = assignment.retry_count + 1;
            let delay = self.config.retry_backoff.delay_for(assignment.retry_count);
            warn!(
                task_id = %task.id,
                agent_id = %assignment.agent_id,
                attempt,
                retry,
                max_retries = task.max_retries,
                delay = ?delay,
                reason = %reason,
                "Task failed; retry scheduled"
            );
            let task_id = task.id;
            state.delayed.insert(
                task_id,
                DelayedRetry {
                    queued: QueuedTask {
                        task,
                        retry_count: retry,
                        failures,
                        enqueued_at: Utc::now(),
                    },
                    due_at: now + delay,
                },
            );
            return FailOutcome::Retrying { retry, delay };
        }

        let dead = DeadLetter {
            retry_attempts: assignment.retry_count,
            failures,
            dead_lettered_at: Utc::now(),
            task,
        };
        error!(
            task_id = %dead.task.id,
            retry_attempts = dead.retry_attempts,
            last_reason = %reason,
            "Task exhausted its retries; moved to dead letters"
        );
        self.metrics.task_dead_lettered();
        self.publish_task(TaskEvent::TaskDeadLettered {
            task_id: dead.task.id,
            retry_attempts: dead.retry_attempts,
            dead_lettered_at: dead.dead_lettered_at,
        });
        state.dead_letters.push(dead.clone());
        FailOutcome::DeadLettered(dead)
    }

    async fn release_in_ledger(&self, task_id: TaskId) {
        if !self.config.consensus_backed {
            return;
        }
        let Some(proposer) = self.proposer.read().clone() else {
            return;
        };
        let command = match (SwarmCommand::Release { task_id }).encode() {
            Ok(command) => command,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Failed to encode release");
                return;
            }
        };
        if let Err(e) = proposer.propose(command).await {
            warn!(task_id = %task_id, error = %e, "Release was not committed");
        }
    }

    async fn drain_logged(&self) {
        if let Err(e) = self.drain_queue().await {
            warn!(error = %e, "Queue drain stopped early");
        }
    }

    fn persist(&self, state: &SwarmState) -> Result<(), aegis_core::StorageError> {
        match &self.queue_store {
            Some(store) => store.save(&state.pending()),
            None => Ok(()),
        }
    }

    fn persist_logged(&self, state: &SwarmState) {
        if let Err(e) = self.persist(state) {
            warn!(error = %e, "Failed to persist pending queue");
        }
    }

    fn record_gauges(&self, state: &SwarmState) {
        metrics::gauge!("aegis_swarm_agents").set(state.agents.len() as f64);
        metrics::gauge!("aegis_swarm_queue_depth").set(state.queue.len() as f64);
        metrics::gauge!("aegis_swarm_tasks_in_flight").set(state.active.len() as f64);
    }

    fn publish_state_change(&self, agent_id: AgentId, from: AgentState, to: AgentState) {
        debug!(agent_id = %agent_id, from = %from, to = %to, "Agent state changed");
        self.publish_agent(AgentLifecycleEvent::AgentStateChanged {
            agent_id,
            from: from.to_string(),
            to: to.to_string(),
            changed_at: Utc::now(),
        });
    }

    fn publish_agent(&self, event: AgentLifecycleEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_agent_event(event);
        }
    }

    fn publish_task(&self, event: TaskEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_task_event(event);
        }
    }
}

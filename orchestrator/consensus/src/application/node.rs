// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Consensus Node
//!
//! Async driver around a [`RaftCore`]. One task per node owns the core and
//! multiplexes the tick timer, the transport inbox and client commands.
//! After every input the driver ships outgoing messages, resolves proposals
//! whose entries were applied, and publishes status changes.
//!
//! Clients hold a cloneable [`ConsensusHandle`], which is the node's
//! [`CommandProposer`]. A proposal made on a follower is forwarded to the
//! known leader. Either way the caller is answered only after the entry is
//! applied to the state machine of the node it proposed on.
//!
//! ## Proposal Outcomes
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Entry applied at the proposed index with the proposing term | `Ok(index)` |
//! | No leader known | `NoLeader` |
//! | Leadership lost, entry overwritten, or `proposal_timeout` elapsed | `NotCommitted` |
//! | Node stopped | `Shutdown` |
//!
//! `NoLeader` and `NotCommitted` are retried by the handle with the
//! configured backoff. A command retried after `NotCommitted` may still have
//! committed the first time, so state machines must tolerate duplicates.

use crate::application::raft::{AppliedEntry, RaftConfig, RaftCore};
use crate::domain::{ConsensusError, ConsensusStatus, Envelope, Message, Role};
use crate::infrastructure::{Inbox, LogStorage, Transport};
use aegis_core::domain::events::ConsensusEvent;
use aegis_core::domain::metrics::MeshMetrics;
use aegis_core::domain::node_config::ConsensusConfig;
use aegis_core::infrastructure::EventBus;
use aegis_core::{
    retry_with_backoff, BackoffPolicy, CommandProposer, KeyValueStore, LogIndex, NodeId,
    ProposalError, StateMachine, Term,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 1024;

type ProposalReply = oneshot::Sender<Result<LogIndex, ProposalError>>;

enum NodeCommand {
    Propose {
        command: Vec<u8>,
        reply: ProposalReply,
    },
    Campaign,
}

enum ProposalOrigin {
    Local(ProposalReply),
    Remote { node: NodeId, request_id: u64 },
}

struct PendingProposal {
    term: Term,
    origin: ProposalOrigin,
    started: Instant,
}

pub struct ConsensusNode {
    core: RaftCore,
    transport: Arc<dyn Transport>,
    inbox: Inbox,
    tick_interval: Duration,
    proposal_timeout: Duration,
    proposal_retry: BackoffPolicy,
    pending: BTreeMap<LogIndex, PendingProposal>,
    forwarded: HashMap<u64, ProposalReply>,
    /// Forwarded proposals the leader committed but this node has yet to apply.
    awaiting_apply: BTreeMap<LogIndex, Vec<ProposalReply>>,
    next_request_id: u64,
    event_bus: Option<EventBus>,
    metrics: Option<Arc<MeshMetrics>>,
    shutdown_token: CancellationToken,
}

impl ConsensusNode {
    /// Build a node from cluster settings. `store` makes the log durable.
    pub fn from_config(
        id: NodeId,
        peers: Vec<NodeId>,
        config: &ConsensusConfig,
        state_machine: Box<dyn StateMachine>,
        store: Option<Arc<dyn KeyValueStore>>,
        transport: Arc<dyn Transport>,
        inbox: Inbox,
    ) -> Result<Self, ConsensusError> {
        let (raft, tick_interval) = RaftConfig::from_consensus_config(id, peers, config);
        let storage = store.map(LogStorage::new);
        let core = RaftCore::new(raft, state_machine, storage)?;
        Ok(Self::new(core, transport, inbox, tick_interval, config))
    }

    pub fn new(
        core: RaftCore,
        transport: Arc<dyn Transport>,
        inbox: Inbox,
        tick_interval: Duration,
        config: &ConsensusConfig,
    ) -> Self {
        Self {
            core,
            transport,
            inbox,
            tick_interval,
            proposal_timeout: config.proposal_timeout,
            proposal_retry: config.proposal_retry,
            pending: BTreeMap::new(),
            forwarded: HashMap::new(),
            awaiting_apply: BTreeMap::new(),
            next_request_id: 0,
            event_bus: None,
            metrics: None,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MeshMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start the driver task and return the client handle.
    pub fn spawn(self) -> (ConsensusHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(self.core.status());
        let handle = ConsensusHandle {
            node_id: self.core.id().clone(),
            commands: commands_tx,
            status: status_rx,
            proposal_timeout: self.proposal_timeout,
            retry: self.proposal_retry,
            shutdown_token: self.shutdown_token.clone(),
        };
        let task = tokio::spawn(self.run(commands_rx, status_tx));
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<NodeCommand>,
        status_tx: watch::Sender<ConsensusStatus>,
    ) {
        info!(
            node_id = %self.core.id(),
            tick_interval = ?self.tick_interval,
            "Starting consensus node"
        );

        let mut tick = interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_status = self.core.status();

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    info!(node_id = %self.core.id(), "Shutdown signal received, stopping consensus node");
                    break;
                }
                _ = tick.tick() => {
                    self.core.tick();
                    self.forwarded.retain(|_, reply| !reply.is_closed());
                }
                Some(envelope) = self.inbox.recv() => self.handle_envelope(envelope),
                Some(command) = commands.recv() => self.handle_command(command),
            }
            self.flush(&mut last_status, &status_tx);
        }

        self.fail_pending(ProposalError::Shutdown);
        let waiting = self.awaiting_apply.values_mut().flat_map(std::mem::take);
        for reply in self.forwarded.drain().map(|(_, r)| r).chain(waiting) {
            let _ = reply.send(Err(ProposalError::Shutdown));
        }
        info!(node_id = %self.core.id(), "Consensus node stopped");
    }

    fn handle_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::Propose { command, reply } => {
                if self.core.is_leader() {
                    self.accept(command, ProposalOrigin::Local(reply));
                } else if let Some(leader) = self.core.leader().cloned() {
                    self.forward(leader, command, reply);
                } else {
                    let _ = reply.send(Err(ProposalError::NoLeader));
                }
            }
            NodeCommand::Campaign => self.core.campaign(),
        }
    }

    fn handle_envelope(&mut self, envelope: Envelope) {
        match envelope.message {
            Message::ProposalForward {
                request_id,
                command,
            } => {
                let origin = ProposalOrigin::Remote {
                    node: envelope.from,
                    request_id,
                };
                if self.core.is_leader() {
                    self.accept(command, origin);
                } else {
                    self.respond(origin, Err(ProposalError::NoLeader));
                }
            }
            Message::ProposalOutcome { request_id, result } => {
                let Some(reply) = self.forwarded.remove(&request_id) else {
                    return;
                };
                match result {
                    Ok(index) if index > self.core.last_applied() => {
                        self.awaiting_apply.entry(index).or_default().push(reply);
                    }
                    result => {
                        let _ = reply.send(result);
                    }
                }
            }
            message => self.core.step(envelope.from, message),
        }
    }

    fn accept(&mut self, command: Vec<u8>, origin: ProposalOrigin) {
        match self.core.propose(command) {
            Ok(index) => {
                self.pending.insert(
                    index,
                    PendingProposal {
                        term: self.core.term(),
                        origin,
                        started: Instant::now(),
                    },
                );
            }
            Err(ConsensusError::NotLeader { .. }) => {
                self.respond(origin, Err(ProposalError::NoLeader));
            }
            Err(e) => {
                warn!(node_id = %self.core.id(), error = %e, "Proposal rejected");
                self.respond(origin, Err(ProposalError::Rejected(e.to_string())));
            }
        }
    }

    fn forward(&mut self, leader: NodeId, command: Vec<u8>, reply: ProposalReply) {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let envelope = Envelope {
            from: self.core.id().clone(),
            to: leader.clone(),
            message: Message::ProposalForward {
                request_id,
                command,
            },
        };
        match self.transport.send(envelope) {
            Ok(()) => {
                debug!(node_id = %self.core.id(), leader = %leader, request_id, "Forwarded proposal to leader");
                self.forwarded.insert(request_id, reply);
            }
            Err(e) => {
                debug!(node_id = %self.core.id(), error = %e, "Could not forward proposal");
                let _ = reply.send(Err(ProposalError::NoLeader));
            }
        }
    }

    fn respond(&mut self, origin: ProposalOrigin, result: Result<LogIndex, ProposalError>) {
        match origin {
            ProposalOrigin::Local(reply) => {
                let _ = reply.send(result);
            }
            ProposalOrigin::Remote { node, request_id } => {
                let envelope = Envelope {
                    from: self.core.id().clone(),
                    to: node,
                    message: Message::ProposalOutcome { request_id, result },
                };
                if let Err(e) = self.transport.send(envelope) {
                    debug!(error = %e, "Could not return forwarded proposal outcome");
                }
            }
        }
    }

    fn resolve(&mut self, applied: AppliedEntry) {
        let Some(pending) = self.pending.remove(&applied.index) else {
            return;
        };
        let result = if pending.term == applied.term {
            if let Some(metrics) = &self.metrics {
                metrics.proposal_committed(pending.started.elapsed());
            }
            Ok(applied.index)
        } else {
            if let Some(metrics) = &self.metrics {
                metrics.proposal_failed();
            }
            Err(ProposalError::NotCommitted(format!(
                "entry {} was replaced by a later leader",
                applied.index
            )))
        };
        self.respond(pending.origin, result);
    }

    fn fail_pending(&mut self, error: ProposalError) {
        let pending = std::mem::take(&mut self.pending);
        for (_, proposal) in pending {
            if let Some(metrics) = &self.metrics {
                metrics.proposal_failed();
            }
            self.respond(proposal.origin, Err(error.clone()));
        }
    }

    fn flush(
        &mut self,
        last_status: &mut ConsensusStatus,
        status_tx: &watch::Sender<ConsensusStatus>,
    ) {
        for envelope in self.core.take_messages() {
            if let Err(e) = self.transport.send(envelope) {
                debug!(node_id = %self.core.id(), error = %e, "Dropped outgoing message");
            }
        }
        for applied in self.core.take_applied() {
            self.resolve(applied);
        }
        let last_applied = self.core.last_applied();
        while let Some(entry) = self.awaiting_apply.first_entry() {
            if *entry.key() > last_applied {
                break;
            }
            let index = *entry.key();
            for reply in entry.remove() {
                let _ = reply.send(Ok(index));
            }
        }

        let status = self.core.status();
        if status == *last_status {
            return;
        }
        if last_status.role == Role::Leader && status.role != Role::Leader {
            self.fail_pending(ProposalError::NotCommitted(
                "leadership lost before commit".to_string(),
            ));
        }
        self.publish_changes(last_status, &status);
        status_tx.send_replace(status.clone());
        *last_status = status;
    }

    fn publish_changes(&self, before: &ConsensusStatus, after: &ConsensusStatus) {
        let Some(bus) = &self.event_bus else {
            return;
        };
        let now = Utc::now();
        if before.role != after.role || before.term != after.term {
            bus.publish_consensus_event(ConsensusEvent::RoleChanged {
                node_id: after.node_id.clone(),
                role: after.role.to_string(),
                term: after.term,
                changed_at: now,
            });
            if after.role == Role::Leader {
                bus.publish_consensus_event(ConsensusEvent::LeaderElected {
                    node_id: after.node_id.clone(),
                    term: after.term,
                    elected_at: now,
                });
            }
        }
        if after.commit_index > before.commit_index {
            bus.publish_consensus_event(ConsensusEvent::EntriesCommitted {
                node_id: after.node_id.clone(),
                commit_index: after.commit_index,
                committed_at: now,
            });
        }
        if after.snapshot_index > before.snapshot_index {
            bus.publish_consensus_event(ConsensusEvent::SnapshotTaken {
                node_id: after.node_id.clone(),
                last_included_index: after.snapshot_index,
                taken_at: now,
            });
        }
    }
}

/// Cloneable client side of a running [`ConsensusNode`].
#[derive(Clone)]
pub struct ConsensusHandle {
    node_id: NodeId,
    commands: mpsc::Sender<NodeCommand>,
    status: watch::Receiver<ConsensusStatus>,
    proposal_timeout: Duration,
    retry: BackoffPolicy,
    shutdown_token: CancellationToken,
}

impl ConsensusHandle {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn status(&self) -> ConsensusStatus {
        self.status.borrow().clone()
    }

    pub fn is_leader(&self) -> bool {
        self.status.borrow().is_leader()
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.status.borrow().leader.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsensusStatus> {
        self.status.clone()
    }

    /// Ask the node to start an election now instead of waiting for its
    /// timeout.
    pub async fn campaign(&self) -> Result<(), ProposalError> {
        self.commands
            .send(NodeCommand::Campaign)
            .await
            .map_err(|_| ProposalError::Shutdown)
    }

    /// One proposal attempt without retries.
    pub async fn propose_once(&self, command: Vec<u8>) -> Result<LogIndex, ProposalError> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(NodeCommand::Propose { command, reply })
            .await
            .map_err(|_| ProposalError::Shutdown)?;

        match tokio::time::timeout(self.proposal_timeout, outcome).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProposalError::Shutdown),
            Err(_) => Err(ProposalError::NotCommitted(format!(
                "no majority within {:?}",
                self.proposal_timeout
            ))),
        }
    }

    /// Wait until the published status satisfies `predicate`.
    pub async fn wait_for(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&ConsensusStatus) -> bool + Send,
    ) -> Option<ConsensusStatus> {
        let mut status = self.status.clone();
        tokio::time::timeout(timeout, async move {
            status
                .wait_for(|s| predicate(s))
                .await
                .map(|s| s.clone())
                .ok()
        })
        .await
        .ok()
        .flatten()
    }

    pub async fn wait_for_leader(&self, timeout: Duration) -> Option<NodeId> {
        self.wait_for(timeout, |s| s.leader.is_some())
            .await
            .and_then(|s| s.leader)
    }

    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }
}

#[async_trait]
impl CommandProposer for ConsensusHandle {
    async fn propose(&self, command: Vec<u8>) -> Result<LogIndex, ProposalError> {
        retry_with_backoff(&self.retry, |_| self.propose_once(command.clone())).await
    }
}

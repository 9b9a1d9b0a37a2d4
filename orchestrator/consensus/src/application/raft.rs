// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Raft Core
//!
//! The deterministic half of a consensus node. [`RaftCore`] owns the
//! replicated log, the election state and the state machine, and advances
//! only when told to: `tick()` for the passage of time, `step()` for an
//! incoming message, `propose()` for a new command. Outgoing messages and
//! applied entries are collected for the caller to drain, which keeps every
//! protocol decision testable without timers or sockets.
//!
//! ## Election
//!
//! A follower that hears nothing from a leader for a randomized number of
//! ticks becomes a candidate for the next term and asks for votes. A vote is
//! granted at most once per term and only to a candidate whose log is at
//! least as up to date. A leader that cannot reach a majority for a full
//! election timeout steps down.
//!
//! ## Commit
//!
//! The leader commits an index once a majority stores it and the entry
//! belongs to the leader's own term. A new leader appends a no-op entry so
//! that entries from earlier terms become committable.

use crate::domain::{
    ConsensusError, ConsensusStatus, Envelope, LogValue, Message, ReplicatedLog, Role,
};
use crate::infrastructure::{HardState, LogStorage, RecoveredState, Snapshot};
use aegis_core::domain::node_config::ConsensusConfig;
use aegis_core::{LogIndex, NodeId, StateMachine, Term};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timing and sizing of a [`RaftCore`], expressed in ticks.
#[derive(Debug, Clone)]
pub struct RaftConfig {
    pub id: NodeId,
    pub peers: Vec<NodeId>,
    pub election_ticks_min: u64,
    pub election_ticks_max: u64,
    pub heartbeat_ticks: u64,
    pub max_entries_per_append: usize,
    /// Applied entries retained before the log is compacted; 0 disables.
    pub snapshot_threshold: u64,
    /// Seed for election timeout jitter; random when `None`.
    pub seed: Option<u64>,
}

impl RaftConfig {
    const TICKS_PER_HEARTBEAT: u64 = 2;

    /// Derive tick counts from wall-clock settings. Returns the config and
    /// the interval at which the driver must call `tick()`.
    pub fn from_consensus_config(
        id: NodeId,
        peers: Vec<NodeId>,
        config: &ConsensusConfig,
    ) -> (Self, Duration) {
        let tick = (config.heartbeat_interval / Self::TICKS_PER_HEARTBEAT as u32)
            .max(Duration::from_millis(1));
        let ticks = |d: Duration| d.as_micros().div_ceil(tick.as_micros()).max(1) as u64;

        let election_ticks_min = ticks(config.election_timeout_min).max(Self::TICKS_PER_HEARTBEAT + 1);
        let election_ticks_max = ticks(config.election_timeout_max).max(election_ticks_min + 1);

        let raft = Self {
            id,
            peers,
            election_ticks_min,
            election_ticks_max,
            heartbeat_ticks: Self::TICKS_PER_HEARTBEAT,
            max_entries_per_append: config.max_entries_per_append.max(1),
            snapshot_threshold: config.snapshot_threshold,
            seed: None,
        };
        (raft, tick)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<(), ConsensusError> {
        if self.peers.contains(&self.id) {
            return Err(ConsensusError::InvalidConfig(format!(
                "node {} lists itself as a peer",
                self.id
            )));
        }
        if self.election_ticks_min == 0 || self.election_ticks_min > self.election_ticks_max {
            return Err(ConsensusError::InvalidConfig(
                "election timeout range is empty".to_string(),
            ));
        }
        if self.heartbeat_ticks >= self.election_ticks_min {
            return Err(ConsensusError::InvalidConfig(
                "heartbeat must be shorter than the election timeout".to_string(),
            ));
        }
        Ok(())
    }
}

/// A committed entry that has just been applied to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEntry {
    pub index: LogIndex,
    pub term: Term,
    pub output: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct Progress {
    next: LogIndex,
    matched: LogIndex,
}

pub struct RaftCore {
    config: RaftConfig,
    role: Role,
    term: Term,
    voted_for: Option<NodeId>,
    leader: Option<NodeId>,
    log: ReplicatedLog,
    last_applied: LogIndex,
    votes: BTreeSet<NodeId>,
    progress: BTreeMap<NodeId, Progress>,
    /// Peers heard from since the last quorum check (leader only).
    recently_active: BTreeSet<NodeId>,
    election_elapsed: u64,
    election_timeout: u64,
    heartbeat_elapsed: u64,
    quorum_check_elapsed: u64,
    outbox: Vec<Envelope>,
    applied: Vec<AppliedEntry>,
    state_machine: Box<dyn StateMachine>,
    storage: Option<LogStorage>,
    snapshot: Option<Snapshot>,
    rng: StdRng,
}

impl RaftCore {
    /// Build a node, recovering term, vote, snapshot and log from `storage`
    /// when present.
    pub fn new(
        config: RaftConfig,
        mut state_machine: Box<dyn StateMachine>,
        mut storage: Option<LogStorage>,
    ) -> Result<Self, ConsensusError> {
        config.validate()?;

        let recovered = match storage.as_mut() {
            Some(storage) => storage.load()?,
            None => RecoveredState::default(),
        };

        let (log, last_applied) = match &recovered.snapshot {
            Some(snapshot) => {
                state_machine.restore(&snapshot.data);
                (
                    ReplicatedLog::restore(
                        snapshot.last_included_index,
                        snapshot.last_included_term,
                        recovered.entries,
                    ),
                    snapshot.last_included_index,
                )
            }
            None => (ReplicatedLog::restore(0, 0, recovered.entries), 0),
        };

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let mut core = Self {
            role: Role::Follower,
            term: recovered.hard_state.term,
            voted_for: recovered.hard_state.voted_for,
            leader: None,
            log,
            last_applied,
            votes: BTreeSet::new(),
            progress: BTreeMap::new(),
            recently_active: BTreeSet::new(),
            election_elapsed: 0,
            election_timeout: config.election_ticks_max,
            heartbeat_elapsed: 0,
            quorum_check_elapsed: 0,
            outbox: Vec::new(),
            applied: Vec::new(),
            state_machine,
            storage,
            snapshot: recovered.snapshot,
            rng,
            config,
        };
        core.reset_election_timer();

        if core.term > 0 || !core.log.is_empty() {
            info!(
                node_id = %core.config.id,
                term = core.term,
                last_index = core.log.last_index(),
                snapshot_index = core.log.snapshot_index(),
                "Recovered consensus state"
            );
        }
        Ok(core)
    }

    pub fn id(&self) -> &NodeId {
        &self.config.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn term(&self) -> Term {
        self.term
    }

    pub fn leader(&self) -> Option<&NodeId> {
        self.leader.as_ref()
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn log(&self) -> &ReplicatedLog {
        &self.log
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    pub fn status(&self) -> ConsensusStatus {
        ConsensusStatus {
            node_id: self.config.id.clone(),
            role: self.role,
            term: self.term,
            leader: self.leader.clone(),
            commit_index: self.log.commit_index(),
            last_applied: self.last_applied,
            last_log_index: self.log.last_index(),
            snapshot_index: self.log.snapshot_index(),
        }
    }

    /// Messages produced since the last call.
    pub fn take_messages(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    /// Entries applied since the last call, in log order.
    pub fn take_applied(&mut self) -> Vec<AppliedEntry> {
        std::mem::take(&mut self.applied)
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    pub fn tick(&mut self) {
        match self.role {
            Role::Leader => {
                self.heartbeat_elapsed += 1;
                if self.heartbeat_elapsed >= self.config.heartbeat_ticks {
                    self.heartbeat_elapsed = 0;
                    self.broadcast_append();
                }
                self.quorum_check_elapsed += 1;
                if self.quorum_check_elapsed >= self.config.election_ticks_max {
                    self.quorum_check_elapsed = 0;
                    let reachable = self.recently_active.len() + 1;
                    self.recently_active.clear();
                    if !self.has_quorum(reachable) {
                        warn!(
                            node_id = %self.config.id,
                            term = self.term,
                            "Leader lost contact with a majority, stepping down"
                        );
                        self.become_follower(self.term, None);
                    }
                }
            }
            Role::Follower | Role::Candidate => {
                self.election_elapsed += 1;
                if self.election_elapsed >= self.election_timeout {
                    self.campaign();
                }
            }
        }
    }

    /// Start an election for the next term right away.
    pub fn campaign(&mut self) {
        if self.role == Role::Leader {
            return;
        }
        self.term += 1;
        self.role = Role::Candidate;
        self.voted_for = Some(self.config.id.clone());
        self.leader = None;
        self.votes = BTreeSet::from([self.config.id.clone()]);
        self.reset_election_timer();

        if !self.persist_hard_state() {
            self.role = Role::Follower;
            return;
        }
        info!(node_id = %self.config.id, term = self.term, "Starting election");

        if self.has_quorum(self.votes.len()) {
            self.become_leader();
            return;
        }
        let request = Message::RequestVote {
            term: self.term,
            candidate: self.config.id.clone(),
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        };
        for peer in self.config.peers.clone() {
            self.send(peer, request.clone());
        }
    }

    /// Append a command to the leader's log and start replicating it.
    pub fn propose(&mut self, command: Vec<u8>) -> Result<LogIndex, ConsensusError> {
        if self.role != Role::Leader {
            return Err(ConsensusError::NotLeader {
                leader: self.leader.clone(),
            });
        }
        let index = self.log.append(self.term, LogValue::Command(command));
        if let Err(e) = self.write_log_from(index) {
            // Uncommitted, so the truncation cannot fail.
            let _ = self.log.truncate_from(index);
            return Err(e);
        }
        debug!(node_id = %self.config.id, index, term = self.term, "Appended proposal");
        self.broadcast_append();
        self.maybe_commit();
        Ok(index)
    }

    pub fn step(&mut self, from: NodeId, message: Message) {
        if let Some(term) = message.term() {
            if term > self.term {
                let leader = match &message {
                    Message::AppendEntries { leader, .. }
                    | Message::InstallSnapshot { leader, .. } => Some(leader.clone()),
                    _ => None,
                };
                debug!(node_id = %self.config.id, from = %from, term, "Observed higher term");
                self.become_follower(term, leader);
            }
        }

        match message {
            Message::RequestVote {
                term,
                candidate,
                last_log_index,
                last_log_term,
            } => self.handle_request_vote(from, term, candidate, last_log_index, last_log_term),
            Message::VoteResponse { term, granted } => {
                self.handle_vote_response(from, term, granted)
            }
            Message::AppendEntries {
                term,
                leader,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            } => self.handle_append_entries(
                from,
                term,
                leader,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            ),
            Message::AppendResponse {
                term,
                success,
                match_index,
                conflict_index,
            } => self.handle_append_response(from, term, success, match_index, conflict_index),
            Message::InstallSnapshot {
                term,
                leader,
                last_included_index,
                last_included_term,
                data,
            } => self.handle_install_snapshot(
                from,
                term,
                leader,
                last_included_index,
                last_included_term,
                data,
            ),
            Message::SnapshotResponse {
                term,
                last_included_index,
            } => self.handle_snapshot_response(from, term, last_included_index),
            Message::ProposalForward { .. } | Message::ProposalOutcome { .. } => {
                debug!("Ignoring proposal forwarding traffic in the raft core");
            }
        }
    }

    // ========================================================================
    // Elections
    // ========================================================================

    fn handle_request_vote(
        &mut self,
        from: NodeId,
        term: Term,
        candidate: NodeId,
        last_log_index: LogIndex,
        last_log_term: Term,
    ) {
        let up_to_date = last_log_term > self.log.last_term()
            || (last_log_term == self.log.last_term() && last_log_index >= self.log.last_index());
        let available = self
            .voted_for
            .as_ref()
            .is_none_or(|voted| voted == &candidate);
        let mut granted = term == self.term && available && up_to_date;

        if granted {
            self.voted_for = Some(candidate.clone());
            if self.persist_hard_state() {
                self.reset_election_timer();
            } else {
                self.voted_for = None;
                granted = false;
            }
        }
        debug!(
            node_id = %self.config.id,
            candidate = %candidate,
            term,
            granted,
            "Answered vote request"
        );
        self.send(
            from,
            Message::VoteResponse {
                term: self.term,
                granted,
            },
        );
    }

    fn handle_vote_response(&mut self, from: NodeId, term: Term, granted: bool) {
        if self.role != Role::Candidate || term != self.term || !granted {
            return;
        }
        self.votes.insert(from);
        if self.has_quorum(self.votes.len()) {
            self.become_leader();
        }
    }

    fn become_leader(&mut self) {
        self.role = Role::Leader;
        self.leader = Some(self.config.id.clone());
        self.heartbeat_elapsed = 0;
        self.quorum_check_elapsed = 0;
        self.recently_active.clear();
        let next = self.log.last_index() + 1;
        self.progress = self
            .config
            .peers
            .iter()
            .map(|peer| (peer.clone(), Progress { next, matched: 0 }))
            .collect();

        info!(node_id = %self.config.id, term = self.term, "Became leader");

        let index = self.log.append(self.term, LogValue::Noop);
        if let Err(e) = self.write_log_from(index) {
            error!(node_id = %self.config.id, error = %e, "Failed to persist leader no-op");
        }
        self.broadcast_append();
        self.maybe_commit();
    }

    fn become_follower(&mut self, term: Term, leader: Option<NodeId>) {
        if term > self.term {
            self.term = term;
            self.voted_for = None;
            self.persist_hard_state();
        }
        if self.role != Role::Follower {
            info!(node_id = %self.config.id, term = self.term, "Became follower");
        }
        self.role = Role::Follower;
        self.leader = leader;
        self.votes.clear();
        self.progress.clear();
        self.recently_active.clear();
        self.reset_election_timer();
    }

    fn reset_election_timer(&mut self) {
        self.election_elapsed = 0;
        self.election_timeout = self
            .rng
            .random_range(self.config.election_ticks_min..=self.config.election_ticks_max);
    }

    fn has_quorum(&self, count: usize) -> bool {
        count > (self.config.peers.len() + 1) / 2
    }

    // ========================================================================
    // Replication
    // ========================================================================

    fn broadcast_append(&mut self) {
        for peer in self.config.peers.clone() {
            self.send_append(&peer);
        }
    }

    fn send_append(&mut self, peer: &NodeId) {
        let Some(progress) = self.progress.get(peer).copied() else {
            return;
        };

        if progress.next <= self.log.snapshot_index() {
            if let Some(snapshot) = &self.snapshot {
                let message = Message::InstallSnapshot {
                    term: self.term,
                    leader: self.config.id.clone(),
                    last_included_index: snapshot.last_included_index,
                    last_included_term: snapshot.last_included_term,
                    data: snapshot.data.clone(),
                };
                self.send(peer.clone(), message);
            }
            return;
        }

        let prev_log_index = progress.next - 1;
        let prev_log_term = self.log.term_at(prev_log_index).unwrap_or(0);
        let entries = self
            .log
            .entries_from(progress.next, self.config.max_entries_per_append);
        let message = Message::AppendEntries {
            term: self.term,
            leader: self.config.id.clone(),
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit: self.log.commit_index(),
        };
        self.send(peer.clone(), message);
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_append_entries(
        &mut self,
        from: NodeId,
        term: Term,
        leader: NodeId,
        mut prev_log_index: LogIndex,
        mut prev_log_term: Term,
        mut entries: Vec<crate::domain::LogEntry>,
        leader_commit: LogIndex,
    ) {
        if term < self.term {
            self.reject_append(from, 0);
            return;
        }
        if self.role != Role::Follower || self.leader.as_ref() != Some(&leader) {
            self.become_follower(term, Some(leader));
        } else {
            self.reset_election_timer();
        }

        // Entries covered by our snapshot are committed and therefore agree.
        let snapshot_index = self.log.snapshot_index();
        if prev_log_index < snapshot_index {
            entries.retain(|entry| entry.index > snapshot_index);
            prev_log_index = snapshot_index;
            prev_log_term = self.log.snapshot_term();
        }

        if !self.log.matches(prev_log_index, prev_log_term) {
            let conflict = if prev_log_index > self.log.last_index() {
                self.log.last_index() + 1
            } else {
                self.log.first_index_of_term(prev_log_index)
            };
            self.reject_append(from, conflict);
            return;
        }

        let last_new = prev_log_index + entries.len() as u64;
        match self.log.merge(entries) {
            Ok(Some(first_written)) => {
                if let Err(e) = self.write_log_from(first_written) {
                    error!(node_id = %self.config.id, error = %e, "Failed to persist replicated entries");
                    let _ = self.log.truncate_from(first_written);
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(node_id = %self.config.id, error = %e, "Rejecting inconsistent append");
                let conflict = self.log.commit_index() + 1;
                self.reject_append(from, conflict);
                return;
            }
        }

        if leader_commit > self.log.commit_index()
            && self.log.commit_to(leader_commit.min(last_new))
        {
            self.apply_committed();
        }

        self.send(
            from,
            Message::AppendResponse {
                term: self.term,
                success: true,
                match_index: last_new,
                conflict_index: 0,
            },
        );
    }

    fn reject_append(&mut self, to: NodeId, conflict_index: LogIndex) {
        self.send(
            to,
            Message::AppendResponse {
                term: self.term,
                success: false,
                match_index: 0,
                conflict_index,
            },
        );
    }

    fn handle_append_response(
        &mut self,
        from: NodeId,
        term: Term,
        success: bool,
        match_index: LogIndex,
        conflict_index: LogIndex,
    ) {
        if self.role != Role::Leader || term != self.term {
            return;
        }
        self.recently_active.insert(from.clone());
        let last_index = self.log.last_index();
        let Some(progress) = self.progress.get_mut(&from) else {
            return;
        };

        if success {
            progress.matched = progress.matched.max(match_index);
            progress.next = progress.next.max(match_index + 1);
            let behind = progress.next <= last_index;
            self.maybe_commit();
            if behind {
                self.send_append(&from);
            } else {
                // the last lagging follower may have just caught up
                self.maybe_compact();
            }
        } else {
            progress.next = conflict_index
                .min(progress.next.saturating_sub(1))
                .max(progress.matched + 1)
                .max(1);
            self.send_append(&from);
        }
    }

    fn maybe_commit(&mut self) {
        if self.role != Role::Leader {
            return;
        }
        let mut matched: Vec<LogIndex> = self.progress.values().map(|p| p.matched).collect();
        matched.push(self.log.last_index());
        matched.sort_unstable_by(|a, b| b.cmp(a));

        let majority = (self.config.peers.len() + 1) / 2 + 1;
        let candidate = matched[majority - 1];
        if candidate > self.log.commit_index()
            && self.log.term_at(candidate) == Some(self.term)
            && self.log.commit_to(candidate)
        {
            debug!(node_id = %self.config.id, commit_index = candidate, "Advanced commit index");
            self.apply_committed();
            // Let followers learn the new commit index without waiting for a heartbeat.
            self.broadcast_append();
        }
    }

    fn apply_committed(&mut self) {
        while self.last_applied < self.log.commit_index() {
            let index = self.last_applied + 1;
            let Some(entry) = self.log.entry(index) else {
                break;
            };
            let output = match &entry.value {
                LogValue::Noop => Vec::new(),
                LogValue::Command(command) => self.state_machine.apply(index, command),
            };
            let term = entry.term;
            self.last_applied = index;
            self.applied.push(AppliedEntry {
                index,
                term,
                output,
            });
        }
        self.maybe_compact();
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Compact once enough applied entries accumulate.
    ///
    /// A leader holds off while any follower has not yet stored everything up
    /// to `last_applied`, so a lagging follower always catches up through
    /// `AppendEntries`. The snapshot is taken at `last_applied`, which is why
    /// the boundary cannot be lowered to the slowest follower instead.
    /// Followers compact freely; a leader elected from one of them serves
    /// `InstallSnapshot` to peers behind its boundary.
    fn maybe_compact(&mut self) {
        let threshold = self.config.snapshot_threshold;
        if threshold == 0 {
            return;
        }
        let retained = self.last_applied - self.log.snapshot_index();
        if retained < threshold {
            return;
        }
        if self.role == Role::Leader
            && self.progress.values().any(|p| p.matched < self.last_applied)
        {
            return;
        }

        let index = self.last_applied;
        let snapshot = Snapshot {
            last_included_index: index,
            last_included_term: self.log.term_at(index).unwrap_or(0),
            data: self.state_machine.snapshot(),
        };
        if let Err(e) = self.log.compact(index) {
            warn!(node_id = %self.config.id, error = %e, "Log compaction skipped");
            return;
        }
        if let Some(storage) = self.storage.as_mut() {
            if let Err(e) = storage.save_snapshot(&snapshot) {
                error!(node_id = %self.config.id, error = %e, "Failed to persist snapshot");
            }
        }
        info!(node_id = %self.config.id, last_included_index = index, "Compacted replicated log");
        self.snapshot = Some(snapshot);
    }

    fn handle_install_snapshot(
        &mut self,
        from: NodeId,
        term: Term,
        leader: NodeId,
        last_included_index: LogIndex,
        last_included_term: Term,
        data: Vec<u8>,
    ) {
        if term < self.term {
            self.send(
                from,
                Message::SnapshotResponse {
                    term: self.term,
                    last_included_index: 0,
                },
            );
            return;
        }
        if self.role != Role::Follower || self.leader.as_ref() != Some(&leader) {
            self.become_follower(term, Some(leader));
        } else {
            self.reset_election_timer();
        }

        if last_included_index <= self.log.commit_index() {
            self.send(
                from,
                Message::SnapshotResponse {
                    term: self.term,
                    last_included_index: self.log.commit_index(),
                },
            );
            return;
        }

        let keeps_suffix = self.log.matches(last_included_index, last_included_term);
        self.state_machine.restore(&data);
        self.log.install_snapshot(last_included_index, last_included_term);
        self.last_applied = last_included_index;

        let snapshot = Snapshot {
            last_included_index,
            last_included_term,
            data,
        };
        if let Some(storage) = self.storage.as_mut() {
            let persisted = storage.save_snapshot(&snapshot).and_then(|_| {
                if keeps_suffix {
                    Ok(())
                } else {
                    storage.clear_after(last_included_index)
                }
            });
            if let Err(e) = persisted {
                error!(node_id = %self.config.id, error = %e, "Failed to persist installed snapshot");
            }
        }
        info!(
            node_id = %self.config.id,
            last_included_index,
            "Installed snapshot from leader"
        );
        self.snapshot = Some(snapshot);

        self.send(
            from,
            Message::SnapshotResponse {
                term: self.term,
                last_included_index,
            },
        );
    }

    fn handle_snapshot_response(&mut self, from: NodeId, term: Term, last_included_index: LogIndex) {
        if self.role != Role::Leader || term != self.term {
            return;
        }
        self.recently_active.insert(from.clone());
        let last_index = self.log.last_index();
        let Some(progress) = self.progress.get_mut(&from) else {
            return;
        };
        progress.matched = progress.matched.max(last_included_index);
        progress.next = progress.next.max(last_included_index + 1);
        let behind = progress.next <= last_index;
        self.maybe_commit();
        if behind {
            self.send_append(&from);
        }
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    fn send(&mut self, to: NodeId, message: Message) {
        self.outbox.push(Envelope {
            from: self.config.id.clone(),
            to,
            message,
        });
    }

    fn persist_hard_state(&self) -> bool {
        let Some(storage) = &self.storage else {
            return true;
        };
        let state = HardState {
            term: self.term,
            voted_for: self.voted_for.clone(),
        };
        match storage.save_hard_state(&state) {
            Ok(()) => true,
            Err(e) => {
                error!(node_id = %self.config.id, error = %e, "Failed to persist hard state");
                false
            }
        }
    }

    fn write_log_from(&mut self, index: LogIndex) -> Result<(), ConsensusError> {
        let Some(storage) = self.storage.as_mut() else {
            return Ok(());
        };
        let entries = self.log.entries_from(index, usize::MAX);
        storage.write_suffix(&entries)
    }
}

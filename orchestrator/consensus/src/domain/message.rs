// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Wire Messages
//!
//! Everything two consensus nodes say to each other. Every message carries
//! the sender's term; a receiver that sees a higher term steps down before
//! doing anything else.

use crate::domain::log::LogEntry;
use aegis_core::{LogIndex, NodeId, ProposalError, Term};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    RequestVote {
        term: Term,
        candidate: NodeId,
        last_log_index: LogIndex,
        last_log_term: Term,
    },
    VoteResponse {
        term: Term,
        granted: bool,
    },
    AppendEntries {
        term: Term,
        leader: NodeId,
        prev_log_index: LogIndex,
        prev_log_term: Term,
        entries: Vec<LogEntry>,
        leader_commit: LogIndex,
    },
    AppendResponse {
        term: Term,
        success: bool,
        /// Highest index known to match the leader when `success`.
        match_index: LogIndex,
        /// Where the leader should retry from when not `success`.
        conflict_index: LogIndex,
    },
    InstallSnapshot {
        term: Term,
        leader: NodeId,
        last_included_index: LogIndex,
        last_included_term: Term,
        data: Vec<u8>,
    },
    SnapshotResponse {
        term: Term,
        last_included_index: LogIndex,
    },
    /// A follower hands a client proposal to the leader it knows of.
    ProposalForward { request_id: u64, command: Vec<u8> },
    /// The leader's answer to a forwarded proposal, sent once the entry is
    /// applied on the leader or the proposal has failed.
    ProposalOutcome {
        request_id: u64,
        result: Result<LogIndex, ProposalError>,
    },
}

impl Message {
    /// Term carried by raft traffic; forwarding traffic is term-less.
    pub fn term(&self) -> Option<Term> {
        match self {
            Message::RequestVote { term, .. }
            | Message::VoteResponse { term, .. }
            | Message::AppendEntries { term, .. }
            | Message::AppendResponse { term, .. }
            | Message::InstallSnapshot { term, .. }
            | Message::SnapshotResponse { term, .. } => Some(*term),
            Message::ProposalForward { .. } | Message::ProposalOutcome { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: NodeId,
    pub to: NodeId,
    pub message: Message,
}

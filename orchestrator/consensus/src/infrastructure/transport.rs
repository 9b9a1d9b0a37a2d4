// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Transport
//!
//! Consensus nodes talk through a [`Transport`]: fire-and-forget delivery of
//! [`Envelope`]s. Loss is tolerated by the protocol (heartbeats resend,
//! elections time out), so `send` only fails when the destination is unknown.
//!
//! [`InMemoryNetwork`] connects nodes inside one process and can cut a node
//! off from everyone else to simulate a partition.

use crate::domain::{ConsensusError, Envelope};
use aegis_core::NodeId;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

pub trait Transport: Send + Sync {
    fn send(&self, envelope: Envelope) -> Result<(), ConsensusError>;
}

pub type Inbox = mpsc::UnboundedReceiver<Envelope>;

#[derive(Default)]
pub struct InMemoryNetwork {
    mailboxes: DashMap<NodeId, mpsc::UnboundedSender<Envelope>>,
    isolated: DashSet<NodeId>,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create the mailbox for `node`. Re-registering replaces the old one,
    /// which is how a restarted node reattaches.
    pub fn register(&self, node: NodeId) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.insert(node, tx);
        rx
    }

    /// Drop all traffic to and from `node` until it is healed.
    pub fn isolate(&self, node: &NodeId) {
        self.isolated.insert(node.clone());
    }

    pub fn heal(&self, node: &NodeId) {
        self.isolated.remove(node);
    }

    pub fn heal_all(&self) {
        self.isolated.clear();
    }

    pub fn is_reachable(&self, from: &NodeId, to: &NodeId) -> bool {
        !self.isolated.contains(from) && !self.isolated.contains(to)
    }
}

impl Transport for InMemoryNetwork {
    fn send(&self, envelope: Envelope) -> Result<(), ConsensusError> {
        if !self.is_reachable(&envelope.from, &envelope.to) {
            trace!(from = %envelope.from, to = %envelope.to, "Dropping message across partition");
            return Ok(());
        }
        let mailbox = self
            .mailboxes
            .get(&envelope.to)
            .ok_or_else(|| ConsensusError::Transport(format!("unknown node {}", envelope.to)))?;
        // A closed mailbox belongs to a stopped node; that is message loss.
        let _ = mailbox.send(envelope);
        Ok(())
    }
}

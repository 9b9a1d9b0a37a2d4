// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sync Service
//!
//! One round of anti-entropy between this node and a set of peers.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Fan out pull/push exchanges, apply what came back
//!
//! Outgoing change sets are captured before any incoming change is merged.
//! Each side therefore sees the other's original write and records a
//! concurrent conflict exactly once. Every peer gets its own timeout; a
//! peer that fails or times out leaves its watermarks untouched so the next
//! round retries from the same point.

use crate::application::memory_service::MemorySynchronizer;
use crate::domain::sync::{ChangeSet, PeerError, PeerFailure, SyncPeer, SyncReport};
use aegis_core::domain::events::MemoryEvent;
use aegis_core::NodeId;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

struct PlannedExchange {
    peer: Arc<dyn SyncPeer>,
    pull_since: u64,
    outgoing: ChangeSet,
}

impl MemorySynchronizer {
    /// Synchronize with every peer, each bounded by `sync_peer_timeout`.
    pub async fn sync(&self, peers: &[Arc<dyn SyncPeer>]) -> SyncReport {
        let deadline = Instant::now() + self.config().sync_peer_timeout;
        self.sync_until(peers, deadline).await
    }

    /// Synchronize with every peer, abandoning any exchange still running at
    /// `deadline`. Rounds on the same synchronizer never overlap.
    pub async fn sync_until(&self, peers: &[Arc<dyn SyncPeer>], deadline: Instant) -> SyncReport {
        let _round = self.sync_gate.lock().await;

        let planned: Vec<PlannedExchange> = peers
            .iter()
            .map(|peer| {
                let peer_id = peer.node_id();
                let (pull_since, push_since) = {
                    let state = self.state.lock();
                    (
                        state.pulled_through.get(&peer_id).copied().unwrap_or(0),
                        state.pushed_through.get(&peer_id).copied().unwrap_or(0),
                    )
                };
                PlannedExchange {
                    peer: peer.clone(),
                    pull_since,
                    outgoing: self.changes_since(push_since),
                }
            })
            .collect();

        let peer_timeout = self.config().sync_peer_timeout;
        let exchanges = planned.into_iter().map(|plan| async move {
            let PlannedExchange {
                peer,
                pull_since,
                outgoing,
            } = plan;
            let peer_id = peer.node_id();
            let pushed_through = outgoing.high_water;
            let local_id = self.node_id().clone();
            let exchange = async move {
                let incoming = peer.pull_changes(pull_since).await?;
                peer.push_changes(local_id, outgoing).await?;
                Ok::<_, PeerError>(incoming)
            };
            let stop_at = deadline.min(Instant::now() + peer_timeout);
            let result = match tokio::time::timeout_at(stop_at, exchange).await {
                Ok(result) => result,
                Err(_) => Err(PeerError::Timeout {
                    peer: peer_id.clone(),
                    timeout: peer_timeout,
                }),
            };
            (peer_id, pushed_through, result)
        });
        let results = join_all(exchanges).await;

        let mut report = SyncReport::default();
        for (peer_id, pushed_through, result) in results {
            let incoming = match result {
                Ok(incoming) => incoming,
                Err(error) => {
                    warn!(peer = %peer_id, error = %error, "Memory sync with peer failed");
                    report.failed.push(PeerFailure {
                        peer: peer_id,
                        error,
                    });
                    continue;
                }
            };

            let pulled_through = incoming.high_water;
            match self.apply_remote(&peer_id, incoming).await {
                Ok(outcome) => {
                    report.entries_applied += outcome.applied;
                    report.conflicts.extend(outcome.conflicts);
                    self.advance_watermarks(&peer_id, pulled_through, pushed_through);
                    report.synced.push(peer_id);
                }
                Err(e) => {
                    warn!(peer = %peer_id, error = %e, "Failed to apply changes from peer");
                    report.failed.push(PeerFailure {
                        peer: peer_id.clone(),
                        error: PeerError::Rejected {
                            peer: peer_id,
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }

        self.metrics
            .sync_completed(report.conflicts.len() as u64, report.failed.len() as u64);
        if let Some(bus) = &self.event_bus {
            bus.publish_memory_event(MemoryEvent::SyncCompleted {
                node_id: self.node_id().clone(),
                peers_synced: report.synced.len(),
                peers_failed: report.failed.len(),
                completed_at: Utc::now(),
            });
        }
        info!(
            synced = report.synced.len(),
            failed = report.failed.len(),
            applied = report.entries_applied,
            conflicts = report.conflicts.len(),
            "Memory sync round finished"
        );
        report
    }

    fn advance_watermarks(&self, peer: &NodeId, pulled_through: u64, pushed_through: u64) {
        let mut state = self.state.lock();
        state.pulled_through.insert(peer.clone(), pulled_through);
        state.pushed_through.insert(peer.clone(), pushed_through);
    }
}

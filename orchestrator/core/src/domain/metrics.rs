// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pull-Based Metrics
//!
//! Counters the mesh core exposes to an external telemetry collector. The
//! collector calls [`MeshMetrics::snapshot`]; the core never pushes.
//!
//! Every counter is also mirrored into the `metrics` facade so that a
//! process which installs a recorder gets the same numbers for free. Without
//! a recorder the facade calls are no-ops.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MeshMetrics {
    tasks_assigned: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_queued: AtomicU64,
    tasks_dead_lettered: AtomicU64,
    proposals_committed: AtomicU64,
    proposals_failed: AtomicU64,
    commit_latency_micros_total: AtomicU64,
    commit_latency_micros_max: AtomicU64,
    searches: AtomicU64,
    search_latency_micros_total: AtomicU64,
    sync_runs: AtomicU64,
    sync_conflicts: AtomicU64,
    sync_peer_failures: AtomicU64,
}

/// Point-in-time copy of [`MeshMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub tasks_assigned: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_queued: u64,
    pub tasks_dead_lettered: u64,
    pub proposals_committed: u64,
    pub proposals_failed: u64,
    pub commit_latency_avg_micros: u64,
    pub commit_latency_max_micros: u64,
    pub searches: u64,
    pub search_latency_avg_micros: u64,
    pub sync_runs: u64,
    pub sync_conflicts: u64,
    pub sync_peer_failures: u64,
}

impl MeshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_assigned(&self) {
        self.tasks_assigned.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("aegis_tasks_assigned_total").increment(1);
    }

    pub fn task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("aegis_tasks_completed_total").increment(1);
    }

    pub fn task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("aegis_tasks_failed_total").increment(1);
    }

    pub fn task_queued(&self) {
        self.tasks_queued.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("aegis_tasks_queued_total").increment(1);
    }

    pub fn task_dead_lettered(&self) {
        self.tasks_dead_lettered.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("aegis_tasks_dead_lettered_total").increment(1);
    }

    pub fn proposal_committed(&self, latency: Duration) {
        let micros = latency.as_micros() as u64;
        self.proposals_committed.fetch_add(1, Ordering::Relaxed);
        self.commit_latency_micros_total
            .fetch_add(micros, Ordering::Relaxed);
        self.commit_latency_micros_max
            .fetch_max(micros, Ordering::Relaxed);
        metrics::counter!("aegis_proposals_committed_total").increment(1);
        metrics::histogram!("aegis_commit_latency_seconds").record(latency.as_secs_f64());
    }

    pub fn proposal_failed(&self) {
        self.proposals_failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("aegis_proposals_failed_total").increment(1);
    }

    pub fn search_completed(&self, latency: Duration) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.search_latency_micros_total
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        metrics::histogram!("aegis_search_latency_seconds").record(latency.as_secs_f64());
    }

    pub fn sync_completed(&self, conflicts: u64, peer_failures: u64) {
        self.sync_runs.fetch_add(1, Ordering::Relaxed);
        self.sync_conflicts.fetch_add(conflicts, Ordering::Relaxed);
        self.sync_peer_failures
            .fetch_add(peer_failures, Ordering::Relaxed);
        metrics::counter!("aegis_sync_runs_total").increment(1);
        metrics::counter!("aegis_sync_conflicts_total").increment(conflicts);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let committed = self.proposals_committed.load(Ordering::Relaxed);
        let searches = self.searches.load(Ordering::Relaxed);
        MetricsSnapshot {
            tasks_assigned: self.tasks_assigned.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_queued: self.tasks_queued.load(Ordering::Relaxed),
            tasks_dead_lettered: self.tasks_dead_lettered.load(Ordering::Relaxed),
            proposals_committed: committed,
            proposals_failed: self.proposals_failed.load(Ordering::Relaxed),
            commit_latency_avg_micros: average(
                self.commit_latency_micros_total.load(Ordering::Relaxed),
                committed,
            ),
            commit_latency_max_micros: self.commit_latency_micros_max.load(Ordering::Relaxed),
            searches,
            search_latency_avg_micros: average(
                self.search_latency_micros_total.load(Ordering::Relaxed),
                searches,
            ),
            sync_runs: self.sync_runs.load(Ordering::Relaxed),
            sync_conflicts: self.sync_conflicts.load(Ordering::Relaxed),
            sync_peer_failures: self.sync_peer_failures.load(Ordering::Relaxed),
        }
    }
}

fn average(total: u64, count: u64) -> u64 {
    if count == 0 {
        0
    } else {
        total / count
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Health Monitor - Background task for agent liveness and due retries
//!
//! Periodically checks agent heartbeats (marking silent agents unhealthy
//! and reaping those past the grace period) and dispatches retries whose
//! backoff delay has passed.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Drive time-based swarm transitions

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aegis_core::domain::node_config::SwarmConfig;

use crate::application::orchestrator::SwarmOrchestrator;
use crate::domain::error::SwarmError;

/// Configuration for the health monitor task
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// How often to run a cycle
    pub interval: Duration,

    /// Whether monitoring is enabled
    pub enabled: bool,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            enabled: true,
        }
    }
}

impl HealthMonitorConfig {
    /// Check once per heartbeat interval, or once per base retry delay when
    /// that is shorter.
    pub fn from_swarm_config(config: &SwarmConfig) -> Self {
        let interval = config
            .heartbeat_interval
            .min(config.retry_backoff.base)
            .max(Duration::from_millis(10));
        Self {
            interval,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCycleReport {
    pub unhealthy: usize,
    pub reaped: usize,
    pub retries_dispatched: usize,
}

/// Health monitor - background task
pub struct HealthMonitor {
    orchestrator: Arc<SwarmOrchestrator>,
    config: HealthMonitorConfig,
    shutdown_token: CancellationToken,
}

impl HealthMonitor {
    pub fn new(orchestrator: Arc<SwarmOrchestrator>, config: HealthMonitorConfig) -> Self {
        Self {
            orchestrator,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the monitor background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Swarm health monitor is disabled");
            return;
        }

        info!(interval = ?self.config.interval, "Starting swarm health monitor");

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.monitor_cycle(Instant::now()).await {
                        Ok(report) if report != HealthCycleReport::default() => {
                            debug!(
                                unhealthy = report.unhealthy,
                                reaped = report.reaped,
                                retries_dispatched = report.retries_dispatched,
                                "Swarm health cycle completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Swarm health cycle failed: {}", e);
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping swarm health monitor");
                    break;
                }
            }
        }

        info!("Swarm health monitor stopped");
    }

    /// Execute a single monitoring cycle as of `now`
    pub async fn monitor_cycle(&self, now: Instant) -> Result<HealthCycleReport, SwarmError> {
        let health = self.orchestrator.check_health(now).await?;
        let dispatched = self.orchestrator.dispatch_due_retries(now).await;
        Ok(HealthCycleReport {
            unhealthy: health.unhealthy.len(),
            reaped: health.reaped.len(),
            retries_dispatched: dispatched.len(),
        })
    }
}

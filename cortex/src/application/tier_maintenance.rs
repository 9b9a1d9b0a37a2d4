// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tier Maintenance - Background task for short-term expiry and compaction
//!
//! Periodically sweeps expired short-term entries and, when configured,
//! compacts the long-term tier below an importance floor.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Keep memory tiers within their retention rules

use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tokio::time::interval;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, debug};

use aegis_core::domain::events::MemoryEvent;
use aegis_core::domain::node_config::MemoryConfig;
use aegis_core::infrastructure::EventBus;

use crate::application::memory_service::MemorySynchronizer;

/// Configuration for the tier maintenance task
#[derive(Debug, Clone)]
pub struct TierMaintenanceConfig {
    /// How often to run a cycle
    pub interval: Duration,

    /// Long-term entries below this importance are compacted; `None` disables compaction
    pub compaction_floor: Option<f32>,

    /// Whether maintenance is enabled
    pub enabled: bool,
}

impl Default for TierMaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            compaction_floor: None,
            enabled: true,
        }
    }
}

impl TierMaintenanceConfig {
    pub fn from_memory_config(config: &MemoryConfig) -> Self {
        Self {
            interval: config.maintenance_interval,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired: usize,
    pub compacted: usize,
}

/// Tier maintenance - background task
pub struct TierMaintenance {
    memory: Arc<MemorySynchronizer>,
    event_bus: Option<EventBus>,
    config: TierMaintenanceConfig,
    shutdown_token: CancellationToken,
}

impl TierMaintenance {
    pub fn new(memory: Arc<MemorySynchronizer>, config: TierMaintenanceConfig) -> Self {
        Self {
            memory,
            event_bus: None,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the maintenance background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Tier maintenance is disabled");
            return;
        }

        info!(
            interval = ?self.config.interval,
            compaction_floor = ?self.config.compaction_floor,
            "Starting tier maintenance background task"
        );

        let mut tick = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running tier maintenance cycle");

                    match self.maintenance_cycle() {
                        Ok(report) => {
                            debug!(
                                expired = report.expired,
                                compacted = report.compacted,
                                "Tier maintenance cycle completed"
                            );
                        }
                        Err(e) => {
                            warn!("Tier maintenance cycle failed: {}", e);
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping tier maintenance");
                    break;
                }
            }
        }

        info!("Tier maintenance background task stopped");
    }

    /// Execute a single maintenance cycle
    pub fn maintenance_cycle(&self) -> Result<MaintenanceReport> {
        let expired = self.memory.expire_short_term();
        let compacted = match self.config.compaction_floor {
            Some(floor) => self.memory.compact_long_term(floor)?,
            None => 0,
        };

        if expired > 0 {
            if let Some(bus) = &self.event_bus {
                bus.publish_memory_event(MemoryEvent::EntriesExpired {
                    count: expired,
                    expired_at: Utc::now(),
                });
            }
        }

        Ok(MaintenanceReport { expired, compacted })
    }
}

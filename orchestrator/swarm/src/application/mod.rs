// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Use cases of the swarm: distribution, execution, health and the
//! replicated assignment ledger.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Drive agents and tasks through their lifecycles

pub mod executor;
pub mod health_monitor;
pub mod ledger;
pub mod orchestrator;

pub use executor::{ExecutionOutcome, TaskExecutor};
pub use health_monitor::{HealthCycleReport, HealthMonitor, HealthMonitorConfig};
pub use ledger::{AssignmentLedger, SwarmCommand};
pub use orchestrator::{HealthReport, SwarmOrchestrator, SwarmStats};

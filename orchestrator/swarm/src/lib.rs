// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-swarm`: Agent Swarm Orchestration
//!
//! Spawns agents, tracks their health and distributes tasks to them with
//! retry, queueing and optional cluster-wide agreement on assignments.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Agent` lifecycle, `Task` eligibility and affinity, priority queue, selection policies, topology |
//! | [`application`] | Application | [`SwarmOrchestrator`], [`TaskExecutor`], [`HealthMonitor`], [`AssignmentLedger`] |
//! | [`infrastructure`] | Infrastructure | [`HandlerRegistry`], durable [`QueueStore`] |
//!
//! ## Key Concepts
//!
//! - **Eligibility**: an agent may take a task when it is `Ready` with spare
//!   capacity, carries the required capability and satisfies the affinity.
//! - **Retry**: failed attempts are retried after `base × 2^retry` (capped)
//!   up to the task's `max_retries`, then moved to the dead-letter list with
//!   every failure recorded.
//! - **Consensus-backed mode**: assignments are proposed through
//!   [`aegis_core::CommandProposer`] and only delivered once committed.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::{
    AssignmentLedger, ExecutionOutcome, HealthMonitor, HealthMonitorConfig, SwarmCommand,
    SwarmOrchestrator, TaskExecutor,
};
pub use infrastructure::{HandlerRegistry, QueueStore};

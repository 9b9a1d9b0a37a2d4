// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application services of the Cortex bounded context

pub mod memory_service;
pub mod sync_service;
pub mod replicated_memory;
pub mod tier_maintenance;

pub use memory_service::{ApplyOutcome, MemoryCommand, MemorySynchronizer};
pub use replicated_memory::MemoryStateMachine;
pub use tier_maintenance::{MaintenanceReport, TierMaintenance, TierMaintenanceConfig};

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Durable log storage and node-to-node transport

pub mod log_storage;
pub mod transport;

pub use log_storage::{HardState, LogStorage, RecoveredState, Snapshot};
pub use transport::{InMemoryNetwork, Inbox, Transport};

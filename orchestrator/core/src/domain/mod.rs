// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Shared domain primitives for every mesh component.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Identifiers, configuration, contracts and events with no I/O

pub mod ids;
pub mod node_config;
pub mod retry;
pub mod persistence;
pub mod replication;
pub mod events;
pub mod metrics;

pub use ids::*;
pub use persistence::{KeyValueStore, StorageError};
pub use replication::{CommandProposer, LogIndex, ProposalError, StateMachine, Term};
pub use retry::{retry_with_backoff, BackoffPolicy, Transient};

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Replicated log, wire messages and node status.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure data structures with no I/O or timers

pub mod error;
pub mod log;
pub mod message;
pub mod status;

pub use error::ConsensusError;
pub use log::{LogEntry, LogValue, ReplicatedLog};
pub use message::{Envelope, Message};
pub use status::{ConsensusStatus, Role};

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Deterministic protocol core and the async node driving it

pub mod node;
pub mod raft;

pub use node::{ConsensusHandle, ConsensusNode};
pub use raft::{AppliedEntry, RaftConfig, RaftCore};

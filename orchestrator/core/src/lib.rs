// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-core`: Shared Kernel of the AEGIS Mesh
//!
//! Types and contracts that every mesh component agrees on.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | identifiers, node configuration, retry policy, persistence and replication contracts, events, metrics |
//! | [`infrastructure`] | Infrastructure | event bus, in-memory and sled key-value stores, logging bootstrap |
//!
//! The cortex (vector index, memory synchronizer), consensus and swarm crates
//! depend on this crate and never on each other's internals.

pub mod domain;
pub mod infrastructure;

pub use domain::*;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-cortex`: Vector Index and Replicated Memory
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | vector entries, distance, quantization, filters, memory entries, version vectors, sync contract |
//! | [`infrastructure`] | Infrastructure | HNSW graph, sharded [`VectorIndex`], embedders, memory tiers, in-process peers |
//! | [`application`] | Application | [`MemorySynchronizer`], anti-entropy sync, strong-namespace state machine, tier maintenance |
//!
//! - **Layer:** Learning & Memory Layer

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use infrastructure::*;
pub use application::{MemoryStateMachine, MemorySynchronizer};

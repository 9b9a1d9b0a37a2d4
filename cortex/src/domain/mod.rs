// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Vector and memory domain types. No I/O, no locking.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Vector entries, distance math, quantization, metadata
//!   filters, memory entries, causality metadata and the peer sync contract

pub mod vector;
pub mod distance;
pub mod quantization;
pub mod filter;
pub mod memory;
pub mod version_vector;
pub mod namespace;
pub mod sync;

pub use vector::*;
pub use filter::MetadataFilter;
pub use memory::*;
pub use version_vector::{Causality, VersionVector};
pub use namespace::FederationRegistry;
pub use sync::*;

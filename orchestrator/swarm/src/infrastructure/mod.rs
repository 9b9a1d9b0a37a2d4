// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Handler lookup and durable queue storage

pub mod handler_registry;
pub mod queue_store;

pub use handler_registry::HandlerRegistry;
pub use queue_store::QueueStore;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Infrastructure adapters shared by every mesh component.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Event bus, key-value storage backends, logging bootstrap

pub mod event_bus;
pub mod logging;
pub mod storage;

pub use event_bus::{EventBus, EventBusError, EventReceiver, MeshEvent};
pub use logging::init_logging;
pub use storage::{InMemoryKeyValueStore, SledKeyValueStore};

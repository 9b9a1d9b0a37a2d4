// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-consensus`: Replicated Log
//!
//! Leader-based consensus over a fixed set of voting members. A command is
//! committed once a majority stores it, and every member applies committed
//! commands to its [`StateMachine`](aegis_core::StateMachine) in the same
//! order.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | replicated log, wire messages, node status, errors |
//! | [`application`] | Application | [`RaftCore`] protocol state machine, [`ConsensusNode`] driver, [`ConsensusHandle`] |
//! | [`infrastructure`] | Infrastructure | durable log storage, transport and the in-process network |
//!
//! ## Usage
//!
//! ```ignore
//! let network = InMemoryNetwork::new();
//! let inbox = network.register(id.clone());
//! let node = ConsensusNode::from_config(id, peers, &config, machine, Some(store), network, inbox)?;
//! let (handle, _task) = node.spawn();
//! let index = handle.propose(command).await?;
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{AppliedEntry, ConsensusHandle, ConsensusNode, RaftConfig, RaftCore};
pub use domain::*;
pub use infrastructure::{InMemoryNetwork, LogStorage, Transport};

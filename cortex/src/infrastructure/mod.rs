// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for the Cortex bounded context

pub(crate) mod hnsw;
pub mod vector_index;
pub mod embedding;
pub mod tiers;
pub mod peer;

pub use vector_index::VectorIndex;
pub use embedding::{Embedder, HashingEmbedder};
pub use peer::LocalPeer;

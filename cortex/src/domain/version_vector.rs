// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-key causality tracking.
//!
//! Each node increments only its own component when it writes a key
//! locally. Merging takes the pointwise maximum, so a merged vector
//! dominates both inputs and re-merging the same input is a no-op.

use aegis_core::NodeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    Equal,
    /// `self` happened before `other`
    Before,
    /// `self` happened after `other`
    After,
    Concurrent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector(BTreeMap<NodeId, u64>);

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: &NodeId) -> u64 {
        self.0.get(node).copied().unwrap_or(0)
    }

    /// Record a local write by `node`. Returns the new counter.
    pub fn increment(&mut self, node: &NodeId) -> u64 {
        let counter = self.0.entry(node.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn merge(&mut self, other: &VersionVector) {
        for (node, counter) in &other.0 {
            let mine = self.0.entry(node.clone()).or_insert(0);
            *mine = (*mine).max(*counter);
        }
    }

    pub fn merged(&self, other: &VersionVector) -> VersionVector {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    pub fn compare(&self, other: &VersionVector) -> Causality {
        let mut less = false;
        let mut greater = false;
        for node in self.0.keys().chain(other.0.keys()) {
            match self.get(node).cmp(&other.get(node)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        match (less, greater) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::Before,
            (false, true) => Causality::After,
            (true, true) => Causality::Concurrent,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &u64)> {
        self.0.iter()
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Namespace isolation and federation.
//!
//! A requester can always read its own namespace. Reading another namespace
//! requires both namespaces to have opted in to sharing with each other.

use crate::domain::memory::Namespace;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Default)]
pub struct FederationRegistry {
    /// `(from, to)`: `from` agrees to share with `to`
    opt_ins: HashSet<(Namespace, Namespace)>,
}

impl FederationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opt_in(&mut self, from: &Namespace, to: &Namespace) {
        self.opt_ins.insert((from.clone(), to.clone()));
    }

    pub fn revoke(&mut self, from: &Namespace, to: &Namespace) {
        self.opt_ins.remove(&(from.clone(), to.clone()));
    }

    pub fn is_federated(&self, a: &Namespace, b: &Namespace) -> bool {
        self.opt_ins.contains(&(a.clone(), b.clone()))
            && self.opt_ins.contains(&(b.clone(), a.clone()))
    }

    pub fn can_read(&self, requester: &Namespace, target: &Namespace) -> bool {
        requester == target || self.is_federated(requester, target)
    }

    /// The requester's own namespace plus every namespace federated with it.
    pub fn readable_from(&self, requester: &Namespace) -> BTreeSet<Namespace> {
        let mut readable: BTreeSet<Namespace> = self
            .opt_ins
            .iter()
            .filter(|(from, to)| from == requester && self.is_federated(from, to))
            .map(|(_, to)| to.clone())
            .collect();
        readable.insert(requester.clone());
        readable
    }
}

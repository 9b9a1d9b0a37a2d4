// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Choosing one agent among the eligible ones.

use crate::domain::agent::Agent;
use aegis_core::domain::node_config::SelectionPolicy;
use aegis_core::AgentId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct AgentSelector {
    policy: SelectionPolicy,
    /// Spawn sequence of the last round-robin pick
    last_pick: Option<u64>,
    rng: StdRng,
}

impl AgentSelector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            last_pick: None,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Reproducible weighted-random picks.
    pub fn with_seed(policy: SelectionPolicy, seed: u64) -> Self {
        Self {
            policy,
            last_pick: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Pick from `candidates`, which must all be eligible.
    pub fn select(&mut self, candidates: &[&Agent]) -> Option<AgentId> {
        if candidates.is_empty() {
            return None;
        }
        let picked = match self.policy {
            SelectionPolicy::RoundRobin => self.round_robin(candidates),
            SelectionPolicy::LeastLoaded => candidates
                .iter()
                .min_by_key(|agent| (agent.load(), agent.spawn_seq))
                .copied(),
            SelectionPolicy::WeightedRandom => self.weighted(candidates),
        }?;
        Some(picked.id)
    }

    /// Next agent after the previous pick in spawn order, wrapping around.
    fn round_robin<'a>(&mut self, candidates: &[&'a Agent]) -> Option<&'a Agent> {
        let after = |agent: &&&Agent| self.last_pick.is_none_or(|last| agent.spawn_seq > last);
        let next = candidates
            .iter()
            .filter(after)
            .min_by_key(|agent| agent.spawn_seq)
            .or_else(|| candidates.iter().min_by_key(|agent| agent.spawn_seq))
            .copied()?;
        self.last_pick = Some(next.spawn_seq);
        Some(next)
    }

    fn weighted<'a>(&mut self, candidates: &[&'a Agent]) -> Option<&'a Agent> {
        let total: u64 = candidates.iter().map(|agent| u64::from(agent.weight)).sum();
        if total == 0 {
            return candidates.first().copied();
        }
        let mut roll = self.rng.random_range(0..total);
        for agent in candidates {
            let weight = u64::from(agent.weight);
            if roll < weight {
                return Some(*agent);
            }
            roll -= weight;
        }
        candidates.last().copied()
    }
}

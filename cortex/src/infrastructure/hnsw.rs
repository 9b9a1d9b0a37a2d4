// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Hierarchical navigable small-world graph for one index shard.
//!
//! Layer assignment draws from a seeded RNG, so inserting the same vectors in
//! the same order always produces the same graph. Deletion is a tombstone:
//! the node keeps routing traffic but never appears in results. Once
//! tombstones make up a quarter of the nodes (and at least
//! [`REBUILD_MIN_TOMBSTONES`]), the shard is rebuilt from its live vectors in
//! sequence order with the original seed.
//!
//! While the shard holds no more live vectors than the requested search
//! width, queries fall back to an exact scan and are therefore exact. A graph
//! search that surfaces too few live vectors is retried with a doubled width
//! until the scan takes over.

use crate::domain::distance::distance;
use crate::domain::quantization::EncodedVector;
use crate::domain::vector::{Metadata, VectorEntry, VectorId};
use aegis_core::domain::node_config::{DistanceMetric, IndexConfig};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

const MAX_LEVEL: usize = 16;

pub(crate) const REBUILD_MIN_TOMBSTONES: usize = 32;

#[derive(Debug, Clone)]
pub(crate) struct StoredVector {
    pub id: VectorId,
    pub seq: u64,
    pub vector: EncodedVector,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Node {
    stored: StoredVector,
    /// One adjacency list per layer, `0..=level`
    links: Vec<Vec<u32>>,
    deleted: bool,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    node: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.node.cmp(&other.node))
    }
}

/// A live vector found by [`HnswGraph::search`].
#[derive(Debug, Clone)]
pub(crate) struct GraphHit {
    pub distance: f32,
    pub seq: u64,
    pub id: VectorId,
    pub metadata: Metadata,
}

pub(crate) struct HnswGraph {
    metric: DistanceMetric,
    max_links: usize,
    max_links_layer0: usize,
    ef_construction: usize,
    level_mult: f64,
    nodes: Vec<Node>,
    by_id: HashMap<VectorId, u32>,
    entry_point: Option<u32>,
    top_level: usize,
    live: usize,
    seed: u64,
    rng: StdRng,
    rebuilds: u64,
}

impl HnswGraph {
    pub fn new(config: &IndexConfig, seed: u64) -> Self {
        let m = config.neighbors_per_node.max(2);
        Self {
            metric: config.metric,
            max_links: m,
            max_links_layer0: m * 2,
            ef_construction: config.construction_search_width,
            level_mult: 1.0 / (m as f64).ln(),
            nodes: Vec::new(),
            by_id: HashMap::new(),
            entry_point: None,
            top_level: 0,
            live: 0,
            seed,
            rng: StdRng::seed_from_u64(seed),
            rebuilds: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn tombstones(&self) -> usize {
        self.nodes.len() - self.live
    }

    pub fn top_level(&self) -> usize {
        self.top_level
    }

    pub fn contains(&self, id: &VectorId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn get(&self, id: &VectorId) -> Option<VectorEntry> {
        let node = &self.nodes[*self.by_id.get(id)? as usize];
        Some(VectorEntry {
            id: node.stored.id,
            vector: node.stored.vector.decode(),
            metadata: node.stored.metadata.clone(),
            created_at: node.stored.created_at,
        })
    }

    fn random_level(&mut self) -> usize {
        // 1 - [0, 1) keeps the argument of ln strictly positive
        let uniform = 1.0 - self.rng.random::<f64>();
        ((-uniform.ln() * self.level_mult).floor() as usize).min(MAX_LEVEL)
    }

    fn distance_to(&self, query: &[f32], node: u32) -> f32 {
        self.nodes[node as usize]
            .stored
            .vector
            .with_decoded(|v| distance(self.metric, query, v))
    }

    fn layer_capacity(&self, layer: usize) -> usize {
        if layer == 0 {
            self.max_links_layer0
        } else {
            self.max_links
        }
    }

    /// Insert a vector. The caller has already checked for duplicate ids.
    pub fn insert(&mut self, stored: StoredVector) {
        let level = self.random_level();
        let query = stored.vector.decode();
        let index = self.nodes.len() as u32;
        self.by_id.insert(stored.id, index);
        self.nodes.push(Node {
            stored,
            links: vec![Vec::new(); level + 1],
            deleted: false,
        });
        self.live += 1;

        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(index);
            self.top_level = level;
            return;
        };

        for layer in (level + 1..=self.top_level).rev() {
            entry = self.greedy_closest(&query, entry, layer);
        }

        let mut entries = vec![entry];
        for layer in (0..=level.min(self.top_level)).rev() {
            let found = self.search_layer(&query, &entries, self.ef_construction, layer);
            let capacity = self.layer_capacity(layer);
            let neighbors: Vec<u32> = found
                .iter()
                .filter(|c| c.node != index)
                .take(capacity)
                .map(|c| c.node)
                .collect();

            self.nodes[index as usize].links[layer] = neighbors.clone();
            for neighbor in neighbors {
                self.connect(neighbor, index, layer);
            }
            entries = found.iter().map(|c| c.node).collect();
        }

        if level > self.top_level {
            self.top_level = level;
            self.entry_point = Some(index);
        }
    }

    /// Add `to` to `from`'s adjacency at `layer`, keeping only the closest links.
    fn connect(&mut self, from: u32, to: u32, layer: usize) {
        let capacity = self.layer_capacity(layer);
        let links = &mut self.nodes[from as usize].links[layer];
        links.push(to);
        if links.len() <= capacity {
            return;
        }

        let origin = self.nodes[from as usize].stored.vector.decode();
        let mut ranked: Vec<Candidate> = self.nodes[from as usize].links[layer]
            .iter()
            .map(|&node| Candidate {
                distance: self.distance_to(&origin, node),
                node,
            })
            .collect();
        ranked.sort();
        ranked.truncate(capacity);
        self.nodes[from as usize].links[layer] = ranked.into_iter().map(|c| c.node).collect();
    }

    fn greedy_closest(&self, query: &[f32], start: u32, layer: usize) -> u32 {
        let mut current = start;
        let mut current_distance = self.distance_to(query, current);
        loop {
            let mut improved = false;
            let links = self.nodes[current as usize]
                .links
                .get(layer)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for &neighbor in links {
                let d = self.distance_to(query, neighbor);
                if d < current_distance {
                    current_distance = d;
                    current = neighbor;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first search of one layer. Returns up to `ef` nodes, closest first.
    /// Tombstoned nodes are traversed and returned; callers filter them.
    fn search_layer(&self, query: &[f32], entries: &[u32], ef: usize, layer: usize) -> Vec<Candidate> {
        let mut visited: HashSet<u32> = entries.iter().copied().collect();
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut best: BinaryHeap<Candidate> = BinaryHeap::new();

        for &node in entries {
            let candidate = Candidate {
                distance: self.distance_to(query, node),
                node,
            };
            frontier.push(Reverse(candidate));
            best.push(candidate);
        }
        while best.len() > ef {
            best.pop();
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if let Some(worst) = best.peek() {
                if best.len() >= ef && current.distance > worst.distance {
                    break;
                }
            }
            let links = self.nodes[current.node as usize]
                .links
                .get(layer)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for &neighbor in links {
                if !visited.insert(neighbor) {
                    continue;
                }
                let candidate = Candidate {
                    distance: self.distance_to(query, neighbor),
                    node: neighbor,
                };
                let admit = best.len() < ef
                    || best.peek().is_some_and(|worst| candidate < *worst);
                if admit {
                    frontier.push(Reverse(candidate));
                    best.push(candidate);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
    }

    /// Up to `limit` live vectors closest to `query`, closest first.
    pub fn search(&self, query: &[f32], limit: usize, ef: usize) -> Vec<GraphHit> {
        if limit == 0 || self.live == 0 {
            return Vec::new();
        }
        let wanted = limit.min(self.live);
        let mut width = ef.max(limit);

        let candidates = loop {
            let Some(mut entry) = self.entry_point.filter(|_| self.live > width) else {
                break self.exact_scan(query);
            };
            for layer in (1..=self.top_level).rev() {
                entry = self.greedy_closest(query, entry, layer);
            }
            let mut found = self.search_layer(query, &[entry], width, 0);
            found.retain(|c| !self.nodes[c.node as usize].deleted);
            if found.len() >= wanted {
                break found;
            }
            width = width.saturating_mul(2);
        };

        candidates
            .into_iter()
            .take(limit)
            .map(|c| {
                let stored = &self.nodes[c.node as usize].stored;
                GraphHit {
                    distance: c.distance,
                    seq: stored.seq,
                    id: stored.id,
                    metadata: stored.metadata.clone(),
                }
            })
            .collect()
    }

    fn exact_scan(&self, query: &[f32]) -> Vec<Candidate> {
        let mut all: Vec<Candidate> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.deleted)
            .map(|(i, _)| Candidate {
                distance: self.distance_to(query, i as u32),
                node: i as u32,
            })
            .collect();
        all.sort();
        all
    }

    /// Tombstone a vector. Returns its sequence number when it was live.
    pub fn delete(&mut self, id: &VectorId) -> Option<u64> {
        let index = self.by_id.remove(id)?;
        let node = &mut self.nodes[index as usize];
        node.deleted = true;
        let seq = node.stored.seq;
        self.live -= 1;

        let tombstones = self.tombstones();
        if tombstones >= REBUILD_MIN_TOMBSTONES && tombstones * 4 >= self.nodes.len() {
            self.rebuild();
        }
        Some(seq)
    }

    /// Drop every tombstone by re-inserting the live vectors into a fresh graph.
    fn rebuild(&mut self) {
        let mut live: Vec<StoredVector> = std::mem::take(&mut self.nodes)
            .into_iter()
            .filter(|node| !node.deleted)
            .map(|node| node.stored)
            .collect();
        live.sort_by_key(|stored| stored.seq);

        self.by_id.clear();
        self.entry_point = None;
        self.top_level = 0;
        self.live = 0;
        self.rng = StdRng::seed_from_u64(self.seed);
        for stored in live {
            self.insert(stored);
        }
        self.rebuilds += 1;
        debug!(live = self.live, rebuilds = self.rebuilds, "Shard rebuilt without tombstones");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dimensions: usize) -> IndexConfig {
        IndexConfig {
            neighbors_per_node: 4,
            construction_search_width: 32,
            ..IndexConfig::new(dimensions, DistanceMetric::Euclidean)
        }
    }

    fn stored(seq: u64, vector: Vec<f32>) -> StoredVector {
        StoredVector {
            id: VectorId::new(),
            seq,
            vector: EncodedVector::Full(vector),
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    fn grid() -> Vec<Vec<f32>> {
        (0..20)
            .flat_map(|x| (0..20).map(move |y| vec![x as f32, y as f32]))
            .collect()
    }

    #[test]
    fn test_graph_search_finds_exact_neighbor() {
        let mut graph = HnswGraph::new(&config(2), 7);
        for (seq, v) in grid().into_iter().enumerate() {
            graph.insert(stored(seq as u64, v));
        }
        assert_eq!(graph.len(), 400);

        let hits = graph.search(&[7.1, 12.9], 1, 32);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].distance < 0.2, "distance {}", hits[0].distance);
    }

    #[test]
    fn test_same_seed_builds_same_graph() {
        let build = || {
            let mut graph = HnswGraph::new(&config(2), 42);
            for (seq, v) in grid().into_iter().enumerate() {
                graph.insert(stored(seq as u64, v));
            }
            graph
        };
        let a = build();
        let b = build();
        assert_eq!(a.top_level(), b.top_level());
        let links_a: Vec<_> = a.nodes.iter().map(|n| n.links.clone()).collect();
        let links_b: Vec<_> = b.nodes.iter().map(|n| n.links.clone()).collect();
        assert_eq!(links_a, links_b);
    }

    #[test]
    fn test_tombstoned_vectors_never_returned() {
        let mut graph = HnswGraph::new(&config(2), 1);
        let first = stored(0, vec![0.0, 0.0]);
        let first_id = first.id;
        graph.insert(first);
        graph.insert(stored(1, vec![5.0, 5.0]));

        assert_eq!(graph.delete(&first_id), Some(0));
        assert_eq!(graph.delete(&first_id), None);
        let hits = graph.search(&[0.0, 0.0], 5, 8);
        assert_eq!(hits.len(), 1);
        assert_ne!(hits[0].id, first_id);
        assert_eq!(graph.tombstones(), 1);
    }

    #[test]
    fn test_search_fills_k_past_deleted_neighbourhood() {
        let mut graph = HnswGraph::new(&config(2), 5);
        let mut ids = Vec::new();
        for (seq, v) in grid().into_iter().enumerate() {
            let s = stored(seq as u64, v);
            ids.push((s.id, s.vector.decode()));
            graph.insert(s);
        }
        // tombstone the 90 vectors closest to the origin, below the rebuild fraction
        ids.sort_by(|a, b| {
            let da = a.1[0] * a.1[0] + a.1[1] * a.1[1];
            let db = b.1[0] * b.1[0] + b.1[1] * b.1[1];
            da.total_cmp(&db)
        });
        let nodes_before = graph.nodes.len();
        for (id, _) in &ids[..90] {
            graph.delete(id);
        }
        assert_eq!(graph.nodes.len(), nodes_before);
        assert_eq!(graph.tombstones(), 90);

        for k in [1, 10, 50, 310, 500] {
            let hits = graph.search(&[0.0, 0.0], k, 16);
            assert_eq!(hits.len(), k.min(graph.len()), "k = {k}");
            assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }

    #[test]
    fn test_rebuild_reclaims_tombstones() {
        let mut graph = HnswGraph::new(&config(2), 9);
        let mut ids = Vec::new();
        for (seq, v) in grid().into_iter().take(128).enumerate() {
            let s = stored(seq as u64, v);
            ids.push(s.id);
            graph.insert(s);
        }

        for id in &ids[..31] {
            graph.delete(id);
        }
        assert_eq!(graph.rebuilds(), 0);
        assert_eq!(graph.tombstones(), 31);

        graph.delete(&ids[31]);
        assert_eq!(graph.rebuilds(), 1);
        assert_eq!(graph.tombstones(), 0);
        assert_eq!(graph.len(), 96);
        assert_eq!(graph.nodes.len(), 96);
        assert!(!graph.contains(&ids[0]));
        assert!(graph.contains(&ids[32]));

        let seqs: Vec<u64> = graph.nodes.iter().map(|n| n.stored.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        let hits = graph.search(&[1.0, 12.0], 3, 16);
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| !ids[..32].contains(&h.id)));
    }

    #[test]
    fn test_links_respect_capacity() {
        let mut graph = HnswGraph::new(&config(2), 3);
        for (seq, v) in grid().into_iter().enumerate() {
            graph.insert(stored(seq as u64, v));
        }
        for node in &graph.nodes {
            for (layer, links) in node.links.iter().enumerate() {
                assert!(links.len() <= graph.layer_capacity(layer));
            }
        }
    }
}

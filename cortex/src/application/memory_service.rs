// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Memory Synchronizer
//!
//! Tiered, namespaced agent memory replicated between nodes.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Store, retrieve and resolve memory entries across tiers
//!
//! # Tiers
//!
//! | Tier | Structure | Leaves when |
//! |------|-----------|-------------|
//! | Immediate | LRU of fixed capacity | evicted; cascades to short-term |
//! | Short-term | TTL map | TTL passes (maintenance sweep) |
//! | Long-term | semantic vector index | compacted below an importance floor |
//!
//! An entry is promoted to long-term when its importance exceeds the
//! promotion threshold or the caller asks for it. Promoted entries are
//! embedded and indexed; the embedding happens outside the state lock, so
//! any write first queues its vector refresh and then flushes the queue.
//!
//! # Replication
//!
//! Namespaces are eventually consistent by default: writes apply locally
//! and reach other nodes through [`sync`](MemorySynchronizer::sync).
//! Namespaces listed in `strong_namespaces` go through the replicated log
//! instead and are skipped by sync.

use crate::domain::filter::MetadataFilter;
use crate::domain::memory::{
    MemoryEntry, MemoryError, MemoryId, MemoryKey, MemoryTier, MemoryValue, Namespace,
    RetrievedMemory, StoreOptions,
};
use crate::domain::namespace::FederationRegistry;
use crate::domain::sync::ChangeSet;
use crate::domain::vector::{Metadata, VectorId};
use crate::domain::version_vector::{Causality, VersionVector};
use crate::infrastructure::embedding::{Embedder, HashingEmbedder};
use crate::infrastructure::tiers::{ImmediateTier, ShortTermTier};
use crate::infrastructure::vector_index::VectorIndex;
use aegis_core::domain::events::MemoryEvent;
use aegis_core::domain::metrics::MeshMetrics;
use aegis_core::domain::node_config::{ConflictStrategy, DistanceMetric, IndexConfig, MemoryConfig};
use aegis_core::infrastructure::EventBus;
use aegis_core::{CommandProposer, NodeId};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Commands carried by the replicated log for strongly-consistent namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MemoryCommand {
    Put(MemoryEntry),
}

/// What applying a batch of remote changes did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub conflicts: Vec<MemoryKey>,
}

struct LongTermRecord {
    entry: MemoryEntry,
    vector: Option<VectorId>,
}

/// A long-term entry whose vector no longer matches its value.
struct StaleVector {
    key: MemoryKey,
    version: VersionVector,
    text: Option<String>,
}

pub(crate) struct MemoryState {
    immediate: ImmediateTier,
    short_term: ShortTermTier,
    long_term: HashMap<MemoryKey, LongTermRecord>,
    by_vector: HashMap<VectorId, MemoryKey>,
    stale_vectors: Vec<StaleVector>,
    change_seq: u64,
    changes: BTreeMap<u64, MemoryKey>,
    key_seq: HashMap<MemoryKey, u64>,
    federation: FederationRegistry,
    pub(crate) pulled_through: HashMap<NodeId, u64>,
    pub(crate) pushed_through: HashMap<NodeId, u64>,
}

impl MemoryState {
    fn new(config: &MemoryConfig) -> Self {
        Self {
            immediate: ImmediateTier::new(config.immediate_capacity),
            short_term: ShortTermTier::new(config.short_term_ttl),
            long_term: HashMap::new(),
            by_vector: HashMap::new(),
            stale_vectors: Vec::new(),
            change_seq: 0,
            changes: BTreeMap::new(),
            key_seq: HashMap::new(),
            federation: FederationRegistry::new(),
            pulled_through: HashMap::new(),
            pushed_through: HashMap::new(),
        }
    }

    /// Freshest copy of `key` across tiers, without touching LRU order.
    fn current(&self, key: &MemoryKey, now: Instant) -> Option<&MemoryEntry> {
        self.immediate
            .peek(key)
            .or_else(|| self.short_term.get(key, now))
            .or_else(|| self.long_term.get(key).map(|record| &record.entry))
    }

    fn record_change(&mut self, key: &MemoryKey) {
        self.change_seq += 1;
        if let Some(previous) = self.key_seq.insert(key.clone(), self.change_seq) {
            self.changes.remove(&previous);
        }
        self.changes.insert(self.change_seq, key.clone());
    }

    /// Install `entry` as the current version of its key in every tier it
    /// belongs to. Returns `true` when the entry was newly promoted.
    fn place(
        &mut self,
        entry: MemoryEntry,
        tier_hint: Option<MemoryTier>,
        promotion_threshold: f32,
        now: Instant,
    ) -> bool {
        let key = entry.key.clone();

        if let Some(evicted) = self.immediate.put(entry.clone()) {
            if !self.long_term.contains_key(&evicted.key) {
                self.short_term.insert(evicted, now);
            }
        }

        if !self.short_term.replace(entry.clone()) && tier_hint == Some(MemoryTier::ShortTerm) {
            self.short_term.insert(entry.clone(), now);
        }

        let already_long_term = self.long_term.contains_key(&key);
        let promote = already_long_term
            || tier_hint == Some(MemoryTier::LongTerm)
            || entry.importance > promotion_threshold;
        if !promote {
            return false;
        }

        self.stale_vectors.push(StaleVector {
            key: key.clone(),
            version: entry.version.clone(),
            text: entry.value.searchable_text(),
        });
        let vector = self.long_term.get(&key).and_then(|record| record.vector);
        self.long_term.insert(key, LongTermRecord { entry, vector });
        !already_long_term
    }

    fn remove_everywhere(&mut self, key: &MemoryKey) -> Option<VectorId> {
        self.immediate.remove(key);
        self.short_term.remove(key);
        let vector = self.long_term.remove(key).and_then(|record| record.vector);
        if let Some(vector) = vector {
            self.by_vector.remove(&vector);
        }
        vector
    }
}

pub struct MemorySynchronizer {
    node_id: NodeId,
    config: MemoryConfig,
    embedder: Arc<dyn Embedder>,
    index: VectorIndex,
    pub(crate) state: Mutex<MemoryState>,
    pub(crate) sync_gate: tokio::sync::Mutex<()>,
    proposer: RwLock<Option<Arc<dyn CommandProposer>>>,
    pub(crate) event_bus: Option<EventBus>,
    pub(crate) metrics: Arc<MeshMetrics>,
}

impl MemorySynchronizer {
    pub fn new(
        node_id: NodeId,
        config: MemoryConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, MemoryError> {
        let index = VectorIndex::new(IndexConfig::new(embedder.dimensions(), DistanceMetric::Cosine))?;
        Ok(Self {
            state: Mutex::new(MemoryState::new(&config)),
            node_id,
            config,
            embedder,
            index,
            sync_gate: tokio::sync::Mutex::new(()),
            proposer: RwLock::new(None),
            event_bus: None,
            metrics: Arc::new(MeshMetrics::new()),
        })
    }

    /// Synchronizer using the built-in [`HashingEmbedder`].
    pub fn with_hashing_embedder(node_id: NodeId, config: MemoryConfig) -> Result<Self, MemoryError> {
        let embedder = Arc::new(HashingEmbedder::new(config.embedding_dimensions));
        Self::new(node_id, config, embedder)
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MeshMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Route writes to strong namespaces through `proposer`.
    ///
    /// Set after construction because the proposer's state machine usually
    /// holds this synchronizer.
    pub fn set_proposer(&self, proposer: Arc<dyn CommandProposer>) {
        *self.proposer.write() = Some(proposer);
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn is_strong(&self, namespace: &Namespace) -> bool {
        self.config
            .strong_namespaces
            .iter()
            .any(|name| name == namespace.as_str())
    }

    /// Write a value. Returns the entry's id, which is stable across updates
    /// of the same key.
    pub async fn store(
        &self,
        key: MemoryKey,
        value: MemoryValue,
        options: StoreOptions,
    ) -> Result<MemoryId, MemoryError> {
        if !(0.0..=1.0).contains(&options.importance) {
            return Err(MemoryError::InvalidImportance(options.importance));
        }
        if self.is_strong(&key.namespace) {
            return self.store_replicated(key, value, options).await;
        }

        let (id, promoted) = {
            let now = Instant::now();
            let mut state = self.state.lock();
            let entry = self.next_version(&state, key, value, options.importance, now);
            let id = entry.id;
            let key = entry.key.clone();
            let promoted = state.place(entry, options.tier_hint, self.config.promotion_threshold, now);
            state.record_change(&key);
            (id, promoted.then_some(key))
        };

        self.flush_vectors().await?;
        if let Some(key) = promoted {
            self.publish_promotion(&key);
        }
        debug!(memory_id = %id, "Memory entry stored");
        Ok(id)
    }

    /// The entry that a local write of `value` to `key` produces.
    fn next_version(
        &self,
        state: &MemoryState,
        key: MemoryKey,
        value: MemoryValue,
        importance: f32,
        now: Instant,
    ) -> MemoryEntry {
        let previous = state.current(&key, now);
        let mut version = previous
            .map(|entry| entry.version.clone())
            .unwrap_or_default();
        version.increment(&self.node_id);
        // never move a key's timestamp backwards, even if the wall clock does
        let updated_at = previous
            .map(|entry| entry.updated_at.max(Utc::now()))
            .unwrap_or_else(Utc::now);
        MemoryEntry {
            id: previous.map(|entry| entry.id).unwrap_or_default(),
            key,
            value,
            importance,
            version,
            updated_at,
            origin: self.node_id.clone(),
        }
    }

    async fn store_replicated(
        &self,
        key: MemoryKey,
        value: MemoryValue,
        options: StoreOptions,
    ) -> Result<MemoryId, MemoryError> {
        let proposer = self
            .proposer
            .read()
            .clone()
            .ok_or_else(|| MemoryError::ConsensusUnavailable(key.namespace.clone()))?;

        let entry = {
            let state = self.state.lock();
            self.next_version(&state, key, value, options.importance, Instant::now())
        };
        let id = entry.id;
        let command = serde_json::to_vec(&MemoryCommand::Put(entry))
            .map_err(|e| MemoryError::Codec(e.to_string()))?;

        let index = proposer.propose(command).await?;
        // the local state machine applied the entry before propose returned
        self.flush_vectors().await?;
        debug!(memory_id = %id, log_index = index, "Replicated memory entry committed");
        Ok(id)
    }

    /// Install a committed entry from the replicated log. Log order is
    /// authoritative, so the entry replaces whatever is present.
    pub fn apply_committed(&self, mut entry: MemoryEntry) {
        let now = Instant::now();
        let mut state = self.state.lock();
        if let Some(current) = state.current(&entry.key, now) {
            entry.version.merge(&current.version);
        }
        let key = entry.key.clone();
        state.place(entry, None, self.config.promotion_threshold, now);
        state.record_change(&key);
    }

    /// Every entry of every strong namespace, for state machine snapshots.
    pub fn strong_entries(&self) -> Vec<MemoryEntry> {
        let now = Instant::now();
        let state = self.state.lock();
        let keys: BTreeSet<&MemoryKey> = state
            .immediate
            .iter()
            .map(|entry| &entry.key)
            .chain(state.short_term.iter(now).map(|entry| &entry.key))
            .chain(state.long_term.keys())
            .filter(|key| self.is_strong(&key.namespace))
            .collect();
        keys.into_iter()
            .filter_map(|key| state.current(key, now).cloned())
            .collect()
    }

    /// Replace all strong-namespace state with `entries`.
    pub fn restore_strong(&self, entries: Vec<MemoryEntry>) {
        let now = Instant::now();
        let stale: Vec<MemoryKey> = self
            .strong_entries()
            .into_iter()
            .map(|entry| entry.key)
            .collect();

        let mut state = self.state.lock();
        for key in &stale {
            if let Some(vector) = state.remove_everywhere(key) {
                if let Err(e) = self.index.delete(&vector) {
                    warn!(error = %e, "Failed to drop vector of restored entry");
                }
            }
        }
        for entry in entries {
            let key = entry.key.clone();
            state.place(entry, None, self.config.promotion_threshold, now);
            state.record_change(&key);
        }
    }

    /// Point lookup. `requester` must own or be federated with the key's namespace.
    pub fn get(&self, requester: &Namespace, key: &MemoryKey) -> Result<Option<MemoryEntry>, MemoryError> {
        let now = Instant::now();
        let mut state = self.state.lock();
        if !state.federation.can_read(requester, &key.namespace) {
            return Err(MemoryError::NamespaceDenied {
                requester: requester.clone(),
                target: key.namespace.clone(),
            });
        }
        if let Some(entry) = state.immediate.touch(key) {
            return Ok(Some(entry.clone()));
        }
        Ok(state.current(key, now).cloned())
    }

    /// `from` agrees to share with `to`. Federation takes effect once both
    /// directions have been opted in.
    pub fn opt_in_federation(&self, from: &Namespace, to: &Namespace) {
        self.state.lock().federation.opt_in(from, to);
        info!(from = %from, to = %to, "Namespace federation opt-in recorded");
    }

    pub fn revoke_federation(&self, from: &Namespace, to: &Namespace) {
        self.state.lock().federation.revoke(from, to);
    }

    pub async fn retrieve_semantic(
        &self,
        requester: &Namespace,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedMemory>, MemoryError> {
        self.retrieve_semantic_at(requester, query, k, Utc::now()).await
    }

    /// Ranked retrieval from the requester's namespace and every namespace
    /// federated with it.
    ///
    /// Long-term candidates come from the vector index; entries in the
    /// immediate tier whose key or text contains the query verbatim are
    /// added on top and always outrank pure vector matches.
    pub async fn retrieve_semantic_at(
        &self,
        requester: &Namespace,
        query: &str,
        k: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<RetrievedMemory>, MemoryError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.flush_vectors().await?;

        let readable = self.state.lock().federation.readable_from(requester);
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;
        let filter = MetadataFilter::new().one_of(
            "namespace",
            readable.iter().map(|namespace| namespace.as_str().to_string()),
        );
        let hits = self.index.search(&embedding, k, Some(&filter))?;

        let weights = &self.config.ranking;
        let keyword_boost = weights.similarity + weights.recency + weights.importance;
        let needle = query.trim().to_lowercase();

        let state = self.state.lock();
        let mut results: HashMap<MemoryKey, RetrievedMemory> = HashMap::new();
        for hit in hits {
            let Some(record) = state
                .by_vector
                .get(&hit.id)
                .and_then(|key| state.long_term.get(key))
            else {
                continue;
            };
            let entry = record.entry.clone();
            results.insert(
                entry.key.clone(),
                RetrievedMemory {
                    score: self.blend(hit.score, &entry, now),
                    similarity: hit.score,
                    keyword_match: false,
                    entry,
                },
            );
        }

        if !needle.is_empty() {
            for entry in state.immediate.iter() {
                if !readable.contains(&entry.key.namespace) || !contains_keyword(entry, &needle) {
                    continue;
                }
                let similarity = results
                    .get(&entry.key)
                    .map(|existing| existing.similarity)
                    .unwrap_or(0.0);
                results.insert(
                    entry.key.clone(),
                    RetrievedMemory {
                        score: keyword_boost + self.blend(similarity, entry, now),
                        similarity,
                        keyword_match: true,
                        entry: entry.clone(),
                    },
                );
            }
        }
        drop(state);

        let mut ranked: Vec<RetrievedMemory> = results.into_values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entry.key.cmp(&b.entry.key))
        });
        ranked.truncate(k);
        Ok(ranked)
    }

    fn blend(&self, similarity: f32, entry: &MemoryEntry, now: DateTime<Utc>) -> f32 {
        let weights = &self.config.ranking;
        let age = (now - entry.updated_at).num_milliseconds().max(0) as f64 / 1000.0;
        let half_life = weights.recency_half_life.as_secs_f64().max(f64::EPSILON);
        let recency = 0.5f64.powf(age / half_life) as f32;
        similarity * weights.similarity + recency * weights.recency + entry.importance * weights.importance
    }

    /// Drop short-term entries whose TTL has passed. Returns how many went.
    pub fn expire_short_term(&self) -> usize {
        let expired = self.state.lock().short_term.expire(Instant::now());
        if !expired.is_empty() {
            debug!(count = expired.len(), "Short-term memory entries expired");
        }
        expired.len()
    }

    /// Remove long-term entries whose importance is below `min_importance`.
    pub fn compact_long_term(&self, min_importance: f32) -> Result<usize, MemoryError> {
        let mut state = self.state.lock();
        let doomed: Vec<MemoryKey> = state
            .long_term
            .iter()
            .filter(|(_, record)| record.entry.importance < min_importance)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            if let Some(record) = state.long_term.remove(key) {
                if let Some(vector) = record.vector {
                    state.by_vector.remove(&vector);
                    self.index.delete(&vector)?;
                }
            }
        }
        if !doomed.is_empty() {
            info!(count = doomed.len(), min_importance, "Long-term memory compacted");
        }
        Ok(doomed.len())
    }

    /// Number of entries held per tier: `(immediate, short_term, long_term)`.
    pub fn tier_sizes(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        (state.immediate.len(), state.short_term.len(), state.long_term.len())
    }

    /// Local changes recorded after `since`, excluding strong namespaces.
    pub fn changes_since(&self, since: u64) -> ChangeSet {
        let now = Instant::now();
        let state = self.state.lock();
        let entries = state
            .changes
            .range(since + 1..)
            .filter(|(_, key)| !self.is_strong(&key.namespace))
            .filter_map(|(_, key)| state.current(key, now).cloned())
            .collect();
        ChangeSet {
            entries,
            high_water: state.change_seq,
        }
    }

    /// Merge entries received from `peer`.
    ///
    /// Causally newer entries replace local ones, older ones are ignored and
    /// concurrent ones are resolved with the configured strategy. The merged
    /// version vector dominates both sides, so applying the same changes
    /// again is a no-op.
    pub async fn apply_remote(&self, peer: &NodeId, changes: ChangeSet) -> Result<ApplyOutcome, MemoryError> {
        let mut outcome = ApplyOutcome::default();
        let mut promoted = Vec::new();
        {
            let now = Instant::now();
            let mut state = self.state.lock();
            for remote in changes.entries {
                if self.is_strong(&remote.key.namespace) {
                    continue;
                }
                let resolved = match state.current(&remote.key, now) {
                    None => Some(remote),
                    Some(local) => match local.version.compare(&remote.version) {
                        Causality::Equal | Causality::After => None,
                        Causality::Before => Some(remote),
                        Causality::Concurrent => {
                            outcome.conflicts.push(remote.key.clone());
                            Some(self.resolve(local, &remote))
                        }
                    },
                };
                let Some(entry) = resolved else {
                    continue;
                };
                let key = entry.key.clone();
                if state.place(entry, None, self.config.promotion_threshold, now) {
                    promoted.push(key.clone());
                }
                state.record_change(&key);
                outcome.applied += 1;
            }
        }

        self.flush_vectors().await?;
        for key in &promoted {
            self.publish_promotion(key);
        }
        for key in &outcome.conflicts {
            debug!(key = %key, peer = %peer, "Concurrent write resolved");
            if let Some(bus) = &self.event_bus {
                bus.publish_memory_event(MemoryEvent::ConflictResolved {
                    namespace: key.namespace.to_string(),
                    key: key.key.clone(),
                    peer: peer.clone(),
                    resolved_at: Utc::now(),
                });
            }
        }
        Ok(outcome)
    }

    /// Deterministic resolution of two concurrent versions. Both nodes reach
    /// the same entry regardless of which side is local.
    fn resolve(&self, local: &MemoryEntry, remote: &MemoryEntry) -> MemoryEntry {
        let (winner, loser) = match local.lww_cmp(remote) {
            Ordering::Greater => (local, remote),
            _ => (remote, local),
        };
        let mut resolved = winner.clone();
        resolved.version = winner.version.merged(&loser.version);
        if self.config.conflict_strategy == ConflictStrategy::Merge {
            if let Some(merged) = winner.value.merge(&loser.value) {
                resolved.value = merged;
            }
        }
        resolved
    }

    /// Re-embed long-term entries whose value changed.
    async fn flush_vectors(&self) -> Result<(), MemoryError> {
        let stale = std::mem::take(&mut self.state.lock().stale_vectors);
        for item in stale {
            let embedding = match &item.text {
                Some(text) => Some(
                    self.embedder
                        .embed(text)
                        .await
                        .map_err(|e| MemoryError::Embedding(e.to_string()))?,
                ),
                None => None,
            };

            let mut state = self.state.lock();
            let state = &mut *state;
            let Some(record) = state.long_term.get_mut(&item.key) else {
                continue;
            };
            if record.entry.version != item.version {
                continue;
            }
            if let Some(old) = record.vector.take() {
                state.by_vector.remove(&old);
                self.index.delete(&old)?;
            }
            if let Some(embedding) = embedding {
                let mut metadata = Metadata::new();
                metadata.insert("namespace".into(), item.key.namespace.as_str().into());
                metadata.insert("key".into(), item.key.key.as_str().into());
                let vector = self.index.insert(embedding, metadata)?;
                record.vector = Some(vector);
                state.by_vector.insert(vector, item.key.clone());
            }
        }
        Ok(())
    }

    fn publish_promotion(&self, key: &MemoryKey) {
        if let Some(bus) = &self.event_bus {
            bus.publish_memory_event(MemoryEvent::EntryPromoted {
                namespace: key.namespace.to_string(),
                key: key.key.clone(),
                promoted_at: Utc::now(),
            });
        }
    }
}

fn contains_keyword(entry: &MemoryEntry, needle: &str) -> bool {
    entry.key.key.to_lowercase().contains(needle)
        || entry
            .value
            .searchable_text()
            .is_some_and(|text| text.to_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::infrastructure::MeshEvent;
    use std::time::Duration;

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn memory(id: &str, config: MemoryConfig) -> MemorySynchronizer {
        MemorySynchronizer::with_hashing_embedder(node(id), config).unwrap()
    }

    fn small_config() -> MemoryConfig {
        MemoryConfig {
            immediate_capacity: 2,
            short_term_ttl: Duration::from_secs(60),
            embedding_dimensions: 64,
            ..MemoryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_store_and_get_round_trip_keeps_id() {
        let memory = memory("n1", small_config());
        let key = MemoryKey::new("agents", "plan");
        let id = memory
            .store(key.clone(), MemoryValue::text("draft"), StoreOptions::default())
            .await
            .unwrap();
        let again = memory
            .store(key.clone(), MemoryValue::text("final"), StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(id, again);

        let entry = memory.get(&Namespace::from("agents"), &key).unwrap().unwrap();
        assert_eq!(entry.value, MemoryValue::text("final"));
        assert_eq!(entry.version.get(&node("n1")), 2);
    }

    #[tokio::test]
    async fn test_invalid_importance_rejected() {
        let memory = memory("n1", small_config());
        let result = memory
            .store(
                MemoryKey::new("a", "k"),
                MemoryValue::text("v"),
                StoreOptions::with_importance(1.5),
            )
            .await;
        assert!(matches!(result, Err(MemoryError::InvalidImportance(_))));
    }

    #[tokio::test]
    async fn test_namespace_isolation_and_mutual_federation() {
        let memory = memory("n1", small_config());
        let key = MemoryKey::new("alpha", "secret");
        memory
            .store(key.clone(), MemoryValue::text("x"), StoreOptions::default())
            .await
            .unwrap();

        let beta = Namespace::from("beta");
        let alpha = Namespace::from("alpha");
        assert!(matches!(
            memory.get(&beta, &key),
            Err(MemoryError::NamespaceDenied { .. })
        ));

        memory.opt_in_federation(&beta, &alpha);
        assert!(memory.get(&beta, &key).is_err());

        memory.opt_in_federation(&alpha, &beta);
        assert!(memory.get(&beta, &key).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_cascades_to_short_term_then_expires() {
        let memory = memory("n1", small_config());
        for name in ["a", "b", "c"] {
            memory
                .store(
                    MemoryKey::new("ns", name),
                    MemoryValue::text(name),
                    StoreOptions::with_importance(0.1),
                )
                .await
                .unwrap();
        }
        assert_eq!(memory.tier_sizes(), (2, 1, 0));
        let ns = Namespace::from("ns");
        assert!(memory.get(&ns, &MemoryKey::new("ns", "a")).unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(memory.expire_short_term(), 1);
        assert!(memory.get(&ns, &MemoryKey::new("ns", "a")).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_promoted_entries_survive_short_term_expiry() {
        let memory = memory("n1", small_config());
        memory
            .store(
                MemoryKey::new("ns", "keep"),
                MemoryValue::text("important fact"),
                StoreOptions::with_importance(0.9),
            )
            .await
            .unwrap();
        for name in ["b", "c"] {
            memory
                .store(MemoryKey::new("ns", name), MemoryValue::text(name), StoreOptions::default())
                .await
                .unwrap();
        }

        tokio::time::advance(Duration::from_secs(120)).await;
        memory.expire_short_term();
        let kept = memory
            .get(&Namespace::from("ns"), &MemoryKey::new("ns", "keep"))
            .unwrap();
        assert!(kept.is_some());
    }

    #[tokio::test]
    async fn test_semantic_retrieval_ranks_related_text_first() {
        let memory = memory("n1", MemoryConfig {
            immediate_capacity: 1,
            embedding_dimensions: 256,
            ..MemoryConfig::default()
        });
        let facts = [
            ("deploy", "database migration runs before every deploy"),
            ("lunch", "team lunch is on friday"),
            ("oncall", "pager rotation changes weekly"),
        ];
        for (key, text) in facts {
            memory
                .store(
                    MemoryKey::new("ops", key),
                    MemoryValue::text(text),
                    StoreOptions::with_importance(0.8),
                )
                .await
                .unwrap();
        }

        let results = memory
            .retrieve_semantic(&Namespace::from("ops"), "database migration", 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.key.key, "deploy");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_keyword_match_in_immediate_tier_is_boosted() {
        let memory = memory("n1", MemoryConfig {
            embedding_dimensions: 128,
            ..MemoryConfig::default()
        });
        memory
            .store(
                MemoryKey::new("ops", "long"),
                MemoryValue::text("rollback procedure for the payments service"),
                StoreOptions::with_importance(0.9),
            )
            .await
            .unwrap();
        memory
            .store(
                MemoryKey::new("ops", "scratch"),
                MemoryValue::text("ticket PAY-1234 is blocked"),
                StoreOptions::with_importance(0.1),
            )
            .await
            .unwrap();

        let results = memory
            .retrieve_semantic(&Namespace::from("ops"), "pay-1234", 2)
            .await
            .unwrap();
        assert_eq!(results[0].entry.key.key, "scratch");
        assert!(results[0].keyword_match);
    }

    #[tokio::test]
    async fn test_retrieval_respects_namespace_isolation() {
        let memory = memory("n1", MemoryConfig {
            embedding_dimensions: 128,
            ..MemoryConfig::default()
        });
        memory
            .store(
                MemoryKey::new("alpha", "k"),
                MemoryValue::text("shared vocabulary words"),
                StoreOptions::with_importance(0.9),
            )
            .await
            .unwrap();

        let beta = Namespace::from("beta");
        let results = memory.retrieve_semantic(&beta, "shared vocabulary", 5).await.unwrap();
        assert!(results.is_empty());

        memory.opt_in_federation(&beta, &Namespace::from("alpha"));
        memory.opt_in_federation(&Namespace::from("alpha"), &beta);
        let results = memory.retrieve_semantic(&beta, "shared vocabulary", 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_recency_breaks_similarity_ties() {
        let memory = memory("n1", MemoryConfig {
            immediate_capacity: 1,
            embedding_dimensions: 64,
            ..MemoryConfig::default()
        });
        memory
            .store(MemoryKey::new("ns", "old"), MemoryValue::text("same words"), StoreOptions::with_importance(0.8))
            .await
            .unwrap();
        memory
            .store(MemoryKey::new("ns", "new"), MemoryValue::text("same words"), StoreOptions::with_importance(0.8))
            .await
            .unwrap();

        let later = Utc::now() + chrono::Duration::hours(2);
        let results = memory
            .retrieve_semantic_at(&Namespace::from("ns"), "different query text", 2, later)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].entry.updated_at >= results[1].entry.updated_at);
    }

    #[tokio::test]
    async fn test_compaction_removes_low_importance_long_term() {
        let memory = memory("n1", small_config());
        for (key, importance) in [("hi", 0.95), ("mid", 0.75)] {
            memory
                .store(
                    MemoryKey::new("ns", key),
                    MemoryValue::text(key),
                    StoreOptions::with_importance(importance),
                )
                .await
                .unwrap();
        }
        assert_eq!(memory.tier_sizes().2, 2);
        assert_eq!(memory.compact_long_term(0.8).unwrap(), 1);
        assert_eq!(memory.tier_sizes().2, 1);
    }

    #[tokio::test]
    async fn test_concurrent_writes_resolve_identically_on_both_nodes() {
        let a = memory("node-a", small_config());
        let b = memory("node-b", small_config());
        let key = MemoryKey::new("ns", "k");

        a.store(key.clone(), MemoryValue::text("from a"), StoreOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        b.store(key.clone(), MemoryValue::text("from b"), StoreOptions::default())
            .await
            .unwrap();

        let from_a = a.changes_since(0);
        let from_b = b.changes_since(0);
        let on_a = a.apply_remote(&node("node-b"), from_b).await.unwrap();
        let on_b = b.apply_remote(&node("node-a"), from_a).await.unwrap();
        assert_eq!(on_a.conflicts, vec![key.clone()]);
        assert_eq!(on_b.conflicts, vec![key.clone()]);

        let ns = Namespace::from("ns");
        let entry_a = a.get(&ns, &key).unwrap().unwrap();
        let entry_b = b.get(&ns, &key).unwrap().unwrap();
        assert_eq!(entry_a, entry_b);
        assert_eq!(entry_a.value, MemoryValue::text("from b"));
        assert_eq!(entry_a.version.get(&node("node-a")), 1);
        assert_eq!(entry_a.version.get(&node("node-b")), 1);

        let again = a.apply_remote(&node("node-b"), b.changes_since(0)).await.unwrap();
        assert_eq!(again.applied, 0);
        assert_eq!(a.get(&ns, &key).unwrap().unwrap().version, entry_a.version);
    }

    #[tokio::test]
    async fn test_merge_strategy_unions_sets() {
        let config = MemoryConfig {
            conflict_strategy: ConflictStrategy::Merge,
            ..small_config()
        };
        let a = memory("node-a", config.clone());
        let b = memory("node-b", config);
        let key = MemoryKey::new("ns", "tags");
        let set = |items: &[&str]| MemoryValue::Set(items.iter().map(|s| s.to_string()).collect());

        a.store(key.clone(), set(&["x"]), StoreOptions::default()).await.unwrap();
        b.store(key.clone(), set(&["y"]), StoreOptions::default()).await.unwrap();

        let from_a = a.changes_since(0);
        let from_b = b.changes_since(0);
        a.apply_remote(&node("node-b"), from_b).await.unwrap();
        b.apply_remote(&node("node-a"), from_a).await.unwrap();

        let ns = Namespace::from("ns");
        let merged = a.get(&ns, &key).unwrap().unwrap();
        assert_eq!(merged.value, set(&["x", "y"]));
        assert_eq!(merged, b.get(&ns, &key).unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_causally_newer_remote_replaces_without_conflict() {
        let a = memory("node-a", small_config());
        let b = memory("node-b", small_config());
        let key = MemoryKey::new("ns", "k");

        a.store(key.clone(), MemoryValue::text("v1"), StoreOptions::default()).await.unwrap();
        b.apply_remote(&node("node-a"), a.changes_since(0)).await.unwrap();
        b.store(key.clone(), MemoryValue::text("v2"), StoreOptions::default()).await.unwrap();

        let outcome = a.apply_remote(&node("node-b"), b.changes_since(0)).await.unwrap();
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.applied, 1);
        let entry = a.get(&Namespace::from("ns"), &key).unwrap().unwrap();
        assert_eq!(entry.value, MemoryValue::text("v2"));
    }

    #[tokio::test]
    async fn test_strong_namespace_without_proposer_fails() {
        let memory = memory("n1", MemoryConfig {
            strong_namespaces: vec!["ledger".into()],
            ..small_config()
        });
        let result = memory
            .store(MemoryKey::new("ledger", "k"), MemoryValue::Counter(1), StoreOptions::default())
            .await;
        assert!(matches!(result, Err(MemoryError::ConsensusUnavailable(_))));
    }

    #[tokio::test]
    async fn test_promotion_publishes_event() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();
        let memory = memory("n1", small_config()).with_event_bus(bus);
        memory
            .store(
                MemoryKey::new("ns", "k"),
                MemoryValue::text("v"),
                StoreOptions {
                    importance: 0.1,
                    tier_hint: Some(MemoryTier::LongTerm),
                },
            )
            .await
            .unwrap();

        let events = receiver.drain();
        assert!(events.iter().any(|event| matches!(
            event,
            MeshEvent::Memory(MemoryEvent::EntryPromoted { key, .. }) if key == "k"
        )));
    }
}

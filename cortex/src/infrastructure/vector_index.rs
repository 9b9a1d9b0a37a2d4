// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Vector Index
//!
//! Sharded approximate nearest-neighbour index. Each shard is an
//! [`HnswGraph`] behind its own reader-writer lock: searches share the lock,
//! inserts and deletes take it exclusively, so a search never observes a
//! half-linked node. Vector ids are mapped to shards by value.
//!
//! ## Ordering
//!
//! Results are ordered by descending score. Equal scores are ordered by
//! insertion sequence, a counter shared by every shard and restored on
//! reload, so ties are reproducible.
//!
//! ## Persistence
//!
//! With a backing [`KeyValueStore`] every insert is written before it becomes
//! visible and every delete is removed from storage before it is tombstoned.
//!
//! | Key | Value |
//! |-----|-------|
//! | `vectors/next_seq` | next insertion sequence |
//! | `vectors/seq/{seq:020}` | the vector, its id, metadata and creation time |
//! | `vectors/id/{id}` | the vector's sequence |

use crate::domain::distance::similarity;
use crate::domain::filter::MetadataFilter;
use crate::domain::quantization::EncodedVector;
use crate::domain::vector::{
    BatchFailure, BatchInsertReport, IndexError, IndexStats, Metadata, NewVector, SearchHit,
    SearchOutcome, VectorEntry, VectorId,
};
use crate::infrastructure::hnsw::{GraphHit, HnswGraph, StoredVector};
use aegis_core::domain::metrics::MeshMetrics;
use aegis_core::domain::node_config::{IndexConfig, QuantizationKind};
use aegis_core::domain::persistence::{get_json, put_json};
use aegis_core::KeyValueStore;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const NEXT_SEQ_KEY: &str = "vectors/next_seq";

fn seq_key(seq: u64) -> String {
    format!("vectors/seq/{seq:020}")
}

fn id_key(id: &VectorId) -> String {
    format!("vectors/id/{id}")
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedVector {
    id: VectorId,
    seq: u64,
    vector: Vec<f32>,
    metadata: Metadata,
    created_at: DateTime<Utc>,
}

pub struct VectorIndex {
    config: IndexConfig,
    shards: Vec<RwLock<HnswGraph>>,
    next_seq: Mutex<u64>,
    /// Live vectors plus in-flight inserts, bounded by `capacity`
    reserved: AtomicUsize,
    store: Option<Arc<dyn KeyValueStore>>,
    metrics: Option<Arc<MeshMetrics>>,
}

impl VectorIndex {
    /// Create an empty in-memory index.
    pub fn new(config: IndexConfig) -> Result<Self, IndexError> {
        config.validate()?;
        let shards = (0..config.shards)
            .map(|shard| {
                let seed = config.seed.wrapping_add(shard as u64);
                RwLock::new(HnswGraph::new(&config, seed))
            })
            .collect();
        Ok(Self {
            config,
            shards,
            next_seq: Mutex::new(0),
            reserved: AtomicUsize::new(0),
            store: None,
            metrics: None,
        })
    }

    /// Open a persistent index, reloading whatever `store` already holds.
    ///
    /// Vectors are re-inserted in their original sequence order, so the
    /// rebuilt graphs match the ones that were persisted. A seq record whose
    /// id record is missing or points elsewhere is a leftover of a failed
    /// write and is skipped.
    pub fn open(config: IndexConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, IndexError> {
        let mut index = Self::new(config)?;
        let next_seq: u64 = get_json(store.as_ref(), NEXT_SEQ_KEY)?.unwrap_or(0);

        let mut restored = 0usize;
        for seq in 0..next_seq {
            let Some(persisted) = get_json::<PersistedVector>(store.as_ref(), &seq_key(seq))? else {
                continue;
            };
            let indexed: Option<u64> = get_json(store.as_ref(), &id_key(&persisted.id))?;
            if indexed != Some(seq) {
                warn!(vector_id = %persisted.id, seq, "Skipping orphaned vector record");
                continue;
            }
            let shard = index.shard_for(&persisted.id);
            let vector = EncodedVector::encode(index.config.quantization, &persisted.vector);
            index.shards[shard].get_mut().insert(StoredVector {
                id: persisted.id,
                seq: persisted.seq,
                vector,
                metadata: persisted.metadata,
                created_at: persisted.created_at,
            });
            restored += 1;
        }

        *index.next_seq.get_mut() = next_seq;
        *index.reserved.get_mut() = restored;
        index.store = Some(store);
        info!(restored, next_seq, "Vector index reloaded from storage");
        Ok(index)
    }

    pub fn with_metrics(mut self, metrics: Arc<MeshMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            shards: self.shards.len(),
            capacity: self.config.capacity,
            ..IndexStats::default()
        };
        for shard in &self.shards {
            let graph = shard.read();
            stats.live_vectors += graph.len();
            stats.tombstones += graph.tombstones();
            stats.max_layer = stats.max_layer.max(graph.top_level());
            stats.rebuilds += graph.rebuilds();
        }
        stats
    }

    fn shard_for(&self, id: &VectorId) -> usize {
        (id.0.as_u128() % self.shards.len() as u128) as usize
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.config.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: vector.len(),
            });
        }
        if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
            return Err(IndexError::InvalidValue(format!(
                "component {position} is not a finite number"
            )));
        }
        Ok(())
    }

    fn reserve_slot(&self) -> Result<(), IndexError> {
        let capacity = self.config.capacity;
        self.reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < capacity).then_some(used + 1)
            })
            .map(|_| ())
            .map_err(|_| IndexError::CapacityExceeded { capacity })
    }

    fn release_slot(&self) {
        self.reserved.fetch_sub(1, Ordering::SeqCst);
    }

    /// Insert a vector under a fresh id.
    pub fn insert(&self, vector: Vec<f32>, metadata: Metadata) -> Result<VectorId, IndexError> {
        self.insert_with_id(None, vector, metadata)
    }

    /// Insert a vector. A failed insert leaves the index unchanged.
    pub fn insert_with_id(
        &self,
        id: Option<VectorId>,
        vector: Vec<f32>,
        metadata: Metadata,
    ) -> Result<VectorId, IndexError> {
        self.check_vector(&vector)?;

        let encoded = EncodedVector::encode(self.config.quantization, &vector);
        if self.config.quantization != QuantizationKind::None {
            let error = encoded.max_error(&vector);
            if error > self.config.quantization_tolerance {
                return Err(IndexError::InvalidValue(format!(
                    "quantization error {error} exceeds tolerance {}",
                    self.config.quantization_tolerance
                )));
            }
        }

        self.reserve_slot()?;
        let id = id.unwrap_or_default();
        let mut graph = self.shards[self.shard_for(&id)].write();
        if graph.contains(&id) {
            self.release_slot();
            return Err(IndexError::DuplicateId(id));
        }

        let created_at = Utc::now();
        let seq = {
            let mut next_seq = self.next_seq.lock();
            let seq = *next_seq;
            if let Some(store) = &self.store {
                let persisted = PersistedVector {
                    id,
                    seq,
                    vector,
                    metadata: metadata.clone(),
                    created_at,
                };
                let written = put_json(store.as_ref(), &seq_key(seq), &persisted)
                    .and_then(|_| put_json(store.as_ref(), &id_key(&id), &seq))
                    .and_then(|_| put_json(store.as_ref(), NEXT_SEQ_KEY, &(seq + 1)));
                if let Err(e) = written {
                    warn!(vector_id = %id, error = %e, "Failed to persist vector");
                    // best effort; whatever survives is skipped on reload
                    let _ = store.delete(&id_key(&id));
                    let _ = store.delete(&seq_key(seq));
                    drop(next_seq);
                    self.release_slot();
                    return Err(e.into());
                }
            }
            *next_seq = seq + 1;
            seq
        };

        graph.insert(StoredVector {
            id,
            seq,
            vector: encoded,
            metadata,
            created_at,
        });
        debug!(vector_id = %id, seq, "Vector inserted");
        Ok(id)
    }

    /// Insert many vectors, reporting success or failure per position.
    pub fn insert_batch(&self, batch: Vec<NewVector>) -> BatchInsertReport {
        let mut report = BatchInsertReport::default();
        for (position, item) in batch.into_iter().enumerate() {
            match self.insert_with_id(item.id, item.vector, item.metadata) {
                Ok(id) => report.inserted.push((position, id)),
                Err(error) => report.failed.push(BatchFailure { position, error }),
            }
        }
        report
    }

    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        Ok(self.search_with_deadline(query, k, filter, None)?.hits)
    }

    /// k-nearest-neighbour search.
    ///
    /// With a filter, `k × filter_expansion` candidates are gathered per shard
    /// before filtering, so fewer than `k` hits may come back even when more
    /// matching vectors exist. Shards not reached before `deadline` are
    /// skipped and the outcome is marked incomplete.
    pub fn search_with_deadline(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
        deadline: Option<Instant>,
    ) -> Result<SearchOutcome, IndexError> {
        self.check_vector(query)?;
        if k == 0 {
            return Ok(SearchOutcome {
                hits: Vec::new(),
                complete: true,
            });
        }

        let started = Instant::now();
        let filter = filter.filter(|f| !f.is_empty());
        let limit = match filter {
            Some(_) => k.saturating_mul(self.config.filter_expansion),
            None => k,
        };

        let mut complete = true;
        let mut candidates: Vec<GraphHit> = Vec::new();
        for shard in &self.shards {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                complete = false;
                break;
            }
            let graph = shard.read();
            candidates.extend(graph.search(query, limit, self.config.query_search_width));
        }

        if let Some(filter) = filter {
            candidates.retain(|hit| filter.matches(&hit.metadata));
        }

        let metric = self.config.metric;
        let mut hits: Vec<(u64, SearchHit)> = candidates
            .into_iter()
            .map(|hit| {
                (
                    hit.seq,
                    SearchHit {
                        id: hit.id,
                        score: similarity(metric, hit.distance),
                        metadata: hit.metadata,
                    },
                )
            })
            .collect();
        hits.sort_by(|(seq_a, a), (seq_b, b)| b.score.total_cmp(&a.score).then(seq_a.cmp(seq_b)));
        hits.truncate(k);

        if let Some(metrics) = &self.metrics {
            metrics.search_completed(started.elapsed());
        }

        Ok(SearchOutcome {
            hits: hits.into_iter().map(|(_, hit)| hit).collect(),
            complete,
        })
    }

    pub fn get(&self, id: &VectorId) -> Option<VectorEntry> {
        self.shards[self.shard_for(id)].read().get(id)
    }

    /// Delete a vector. Returns `false` when it was not present.
    pub fn delete(&self, id: &VectorId) -> Result<bool, IndexError> {
        let mut graph = self.shards[self.shard_for(id)].write();
        if !graph.contains(id) {
            return Ok(false);
        }
        if let Some(store) = &self.store {
            if let Some(seq) = get_json::<u64>(store.as_ref(), &id_key(id))? {
                store.delete(&seq_key(seq))?;
            }
            store.delete(&id_key(id))?;
        }
        graph.delete(id);
        self.release_slot();
        debug!(vector_id = %id, "Vector deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::domain::node_config::DistanceMetric;
    use aegis_core::infrastructure::InMemoryKeyValueStore;
    use aegis_core::StorageError;
    use serde_json::json;
    use std::time::Duration;

    fn cosine(dimensions: usize) -> IndexConfig {
        IndexConfig::new(dimensions, DistanceMetric::Cosine)
    }

    fn unit_axes(index: &VectorIndex) -> Vec<VectorId> {
        [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
            .into_iter()
            .map(|v| index.insert(v.to_vec(), Metadata::new()).unwrap())
            .collect()
    }

    #[test]
    fn test_orthogonal_axes_ranked_by_cosine() {
        let index = VectorIndex::new(cosine(3)).unwrap();
        let ids = unit_axes(&index);

        let hits = index.search(&[0.9, 0.1, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, ids[0]);
        assert_eq!(hits[1].id, ids[1]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_unchanged() {
        let index = VectorIndex::new(cosine(3)).unwrap();
        let err = index.insert(vec![1.0, 0.0], Metadata::new()).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(index.is_empty());
        assert!(matches!(
            index.search(&[1.0], 1, None),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_component_rejected() {
        let index = VectorIndex::new(cosine(2)).unwrap();
        assert!(matches!(
            index.insert(vec![f32::NAN, 1.0], Metadata::new()),
            Err(IndexError::InvalidValue(_))
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_capacity_exceeded() {
        let config = IndexConfig {
            capacity: 2,
            ..cosine(2)
        };
        let index = VectorIndex::new(config).unwrap();
        index.insert(vec![1.0, 0.0], Metadata::new()).unwrap();
        let id = index.insert(vec![0.0, 1.0], Metadata::new()).unwrap();
        assert!(matches!(
            index.insert(vec![1.0, 1.0], Metadata::new()),
            Err(IndexError::CapacityExceeded { capacity: 2 })
        ));

        assert!(index.delete(&id).unwrap());
        index.insert(vec![1.0, 1.0], Metadata::new()).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let index = VectorIndex::new(cosine(2)).unwrap();
        let id = VectorId::new();
        index.insert_with_id(Some(id), vec![1.0, 0.0], Metadata::new()).unwrap();
        assert!(matches!(
            index.insert_with_id(Some(id), vec![0.0, 1.0], Metadata::new()),
            Err(IndexError::DuplicateId(dup)) if dup == id
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_deleted_vector_never_returned() {
        let index = VectorIndex::new(cosine(3)).unwrap();
        let ids = unit_axes(&index);
        assert!(index.delete(&ids[0]).unwrap());
        assert!(!index.delete(&ids[0]).unwrap());

        let hits = index.search(&[1.0, 0.0, 0.0], 3, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.id != ids[0]));
        assert!(index.get(&ids[0]).is_none());
        assert_eq!(index.stats().tombstones, 1);
    }

    #[test]
    fn test_equal_scores_ordered_by_insertion() {
        let config = IndexConfig {
            shards: 4,
            ..cosine(2)
        };
        let index = VectorIndex::new(config).unwrap();
        let ids: Vec<_> = (0..8)
            .map(|_| index.insert(vec![1.0, 1.0], Metadata::new()).unwrap())
            .collect();

        let hits = index.search(&[1.0, 1.0], 8, None).unwrap();
        let returned: Vec<_> = hits.iter().map(|h| h.id).collect();
        assert_eq!(returned, ids);
    }

    #[test]
    fn test_k_larger_than_index_and_zero_k() {
        let index = VectorIndex::new(cosine(3)).unwrap();
        unit_axes(&index);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10, None).unwrap().len(), 3);
        assert!(index.search(&[1.0, 0.0, 0.0], 0, None).unwrap().is_empty());
    }

    #[test]
    fn test_metadata_filter_expands_candidates() {
        let index = VectorIndex::new(cosine(2)).unwrap();
        for i in 0..6 {
            let lang = if i % 2 == 0 { "rust" } else { "go" };
            let mut metadata = Metadata::new();
            metadata.insert("lang".into(), json!(lang));
            index.insert(vec![1.0, i as f32 * 0.1], metadata).unwrap();
        }

        let filter = MetadataFilter::new().equals("lang", "go");
        let hits = index.search(&[1.0, 0.0], 2, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.metadata["lang"] == json!("go")));
    }

    #[test]
    fn test_expired_deadline_reports_incomplete() {
        let index = VectorIndex::new(IndexConfig {
            shards: 2,
            ..cosine(3)
        })
        .unwrap();
        unit_axes(&index);
        let past = Instant::now() - Duration::from_millis(1);
        let outcome = index
            .search_with_deadline(&[1.0, 0.0, 0.0], 1, None, Some(past))
            .unwrap();
        assert!(!outcome.complete);
        assert!(outcome.hits.is_empty());
    }

    #[test]
    fn test_quantization_tolerance_enforced() {
        let config = IndexConfig {
            quantization: QuantizationKind::Int8,
            quantization_tolerance: 0.01,
            ..IndexConfig::new(2, DistanceMetric::Euclidean)
        };
        let index = VectorIndex::new(config).unwrap();
        assert!(matches!(
            index.insert(vec![1000.0, 0.3], Metadata::new()),
            Err(IndexError::InvalidValue(_))
        ));
        let id = index.insert(vec![0.5, -0.25], Metadata::new()).unwrap();
        let stored = index.get(&id).unwrap();
        assert!((stored.vector[0] - 0.5).abs() <= 0.01);
        assert!((stored.vector[1] + 0.25).abs() <= 0.01);
    }

    #[test]
    fn test_batch_reports_per_position() {
        let index = VectorIndex::new(cosine(2)).unwrap();
        let report = index.insert_batch(vec![
            NewVector::new(vec![1.0, 0.0]),
            NewVector::new(vec![1.0]),
            NewVector::new(vec![0.0, 1.0]).with_metadata("tag", json!("x")),
        ]);
        assert!(!report.is_complete());
        assert_eq!(
            report.inserted.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].position, 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_reload_restores_vectors_and_tie_order() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let (ids, deleted) = {
            let index = VectorIndex::open(cosine(3), store.clone()).unwrap();
            let ids = unit_axes(&index);
            let dup = index.insert(vec![1.0, 0.0, 0.0], Metadata::new()).unwrap();
            index.delete(&ids[2]).unwrap();
            (vec![ids[0], dup, ids[1]], ids[2])
        };

        let reopened = VectorIndex::open(cosine(3), store).unwrap();
        assert_eq!(reopened.len(), 3);
        assert!(reopened.get(&deleted).is_none());

        let hits = reopened.search(&[1.0, 0.0, 0.0], 3, None).unwrap();
        let returned: Vec<_> = hits.iter().map(|h| h.id).collect();
        assert_eq!(returned, ids);

        let fresh = reopened.insert(vec![0.0, 0.0, 1.0], Metadata::new()).unwrap();
        assert!(reopened.get(&fresh).is_some());
    }

    /// Fails every write to one key.
    struct FailingKey {
        inner: InMemoryKeyValueStore,
        key: &'static str,
    }

    impl KeyValueStore for FailingKey {
        fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
            if key == self.key {
                return Err(StorageError::Backend("write refused".into()));
            }
            self.inner.put(key, value)
        }

        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.inner.delete(key)
        }
    }

    #[test]
    fn test_failed_persist_leaves_no_records() {
        let inner = InMemoryKeyValueStore::new();
        let store = Arc::new(FailingKey {
            inner: inner.clone(),
            key: NEXT_SEQ_KEY,
        });
        let index = VectorIndex::open(cosine(2), store).unwrap();
        let id = VectorId::new();
        assert!(matches!(
            index.insert_with_id(Some(id), vec![1.0, 0.0], Metadata::new()),
            Err(IndexError::Storage(StorageError::Backend(_)))
        ));
        assert!(index.is_empty());
        assert!(inner.is_empty());
    }

    #[test]
    fn test_reload_skips_orphaned_seq_records() {
        let store = InMemoryKeyValueStore::new();
        let kept = {
            let index = VectorIndex::open(cosine(2), Arc::new(store.clone())).unwrap();
            index.insert(vec![1.0, 0.0], Metadata::new()).unwrap()
        };
        // a seq record whose id record never landed
        let orphan = PersistedVector {
            id: VectorId::new(),
            seq: 1,
            vector: vec![0.0, 1.0],
            metadata: Metadata::new(),
            created_at: Utc::now(),
        };
        put_json(&store, &seq_key(1), &orphan).unwrap();
        put_json(&store, NEXT_SEQ_KEY, &2u64).unwrap();

        let reopened = VectorIndex::open(cosine(2), Arc::new(store)).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.get(&kept).is_some());
        assert!(reopened.get(&orphan.id).is_none());
    }

    #[test]
    fn test_search_returns_inserted_vector_first() {
        let index = VectorIndex::new(IndexConfig {
            neighbors_per_node: 8,
            query_search_width: 128,
            ..IndexConfig::new(8, DistanceMetric::Euclidean)
        })
        .unwrap();
        let mut seed = 17u64;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
        };
        let vectors: Vec<Vec<f32>> = (0..300).map(|_| (0..8).map(|_| next()).collect()).collect();
        let ids: Vec<_> = vectors
            .iter()
            .map(|v| index.insert(v.clone(), Metadata::new()).unwrap())
            .collect();

        for (id, vector) in ids.iter().zip(&vectors).step_by(17) {
            let hits = index.search(vector, 1, None).unwrap();
            assert_eq!(hits[0].id, *id);
        }
    }

    #[test]
    fn test_concurrent_inserts_and_searches() {
        let index = Arc::new(
            VectorIndex::new(IndexConfig {
                shards: 3,
                ..IndexConfig::new(4, DistanceMetric::Euclidean)
            })
            .unwrap(),
        );

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let index = index.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            let v = vec![t as f32, i as f32, (t * i) as f32, 1.0];
                            index.insert(v, Metadata::new()).unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let reader = {
            let index = index.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    let hits = index.search(&[1.0, i as f32, 0.0, 1.0], 5, None).unwrap();
                    let mut seen: Vec<_> = hits.iter().map(|h| h.id).collect();
                    seen.sort();
                    seen.dedup();
                    assert_eq!(seen.len(), hits.len());
                }
            })
        };

        let mut all: Vec<VectorId> = writers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();
        reader.join().unwrap();

        all.sort();
        all.dedup();
        assert_eq!(all.len(), 200);
        assert_eq!(index.len(), 200);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Durable Log Storage
//!
//! Persists a node's hard state, log entries and latest snapshot on any
//! [`KeyValueStore`] with bincode encoding, so that a restarted node comes
//! back with the same term, vote and log.
//!
//! ## Key Layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `raft/hard_state` | [`HardState`] |
//! | `raft/bounds` | first and last persisted log index |
//! | `raft/snapshot` | [`Snapshot`] |
//! | `raft/log/{index:020}` | [`LogEntry`] |

use crate::domain::{ConsensusError, LogEntry};
use aegis_core::domain::persistence::{get_decoded, put_encoded};
use aegis_core::{KeyValueStore, LogIndex, NodeId, Term};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const HARD_STATE_KEY: &str = "raft/hard_state";
const BOUNDS_KEY: &str = "raft/bounds";
const SNAPSHOT_KEY: &str = "raft/snapshot";

fn entry_key(index: LogIndex) -> String {
    format!("raft/log/{index:020}")
}

/// State that must survive a restart before any vote or acknowledgement is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardState {
    pub term: Term,
    pub voted_for: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LogBounds {
    first: LogIndex,
    last: LogIndex,
}

impl Default for LogBounds {
    fn default() -> Self {
        Self { first: 1, last: 0 }
    }
}

#[derive(Debug, Default)]
pub struct RecoveredState {
    pub hard_state: HardState,
    pub snapshot: Option<Snapshot>,
    pub entries: Vec<LogEntry>,
}

pub struct LogStorage {
    store: Arc<dyn KeyValueStore>,
    bounds: LogBounds,
}

impl LogStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            bounds: LogBounds::default(),
        }
    }

    /// Read everything back. Must be called before any write.
    pub fn load(&mut self) -> Result<RecoveredState, ConsensusError> {
        let store = self.store.as_ref();
        self.bounds = get_decoded(store, BOUNDS_KEY)?.unwrap_or_default();
        let hard_state = get_decoded(store, HARD_STATE_KEY)?.unwrap_or_default();
        let snapshot: Option<Snapshot> = get_decoded(store, SNAPSHOT_KEY)?;

        let mut entries = Vec::new();
        for index in self.bounds.first..=self.bounds.last {
            match get_decoded::<LogEntry>(store, &entry_key(index))? {
                Some(entry) => entries.push(entry),
                None => break,
            }
        }

        debug!(
            first = self.bounds.first,
            last = self.bounds.last,
            recovered = entries.len(),
            "Recovered replicated log"
        );
        Ok(RecoveredState {
            hard_state,
            snapshot,
            entries,
        })
    }

    pub fn save_hard_state(&self, state: &HardState) -> Result<(), ConsensusError> {
        put_encoded(self.store.as_ref(), HARD_STATE_KEY, state)?;
        Ok(())
    }

    /// Write `entries`, a contiguous run that replaces whatever the store
    /// held from its first index onwards.
    pub fn write_suffix(&mut self, entries: &[LogEntry]) -> Result<(), ConsensusError> {
        let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
            return Ok(());
        };
        let store = self.store.as_ref();
        for entry in entries {
            put_encoded(store, &entry_key(entry.index), entry)?;
        }
        for stale in (last.index + 1)..=self.bounds.last {
            store.delete(&entry_key(stale))?;
        }
        if self.bounds.last < self.bounds.first {
            self.bounds.first = first.index;
        }
        self.bounds.last = last.index;
        put_encoded(store, BOUNDS_KEY, &self.bounds)?;
        Ok(())
    }

    /// Store `snapshot` and drop the log entries it covers.
    pub fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ConsensusError> {
        let store = self.store.as_ref();
        put_encoded(store, SNAPSHOT_KEY, snapshot)?;

        let covered = snapshot.last_included_index;
        for index in self.bounds.first..=covered.min(self.bounds.last) {
            store.delete(&entry_key(index))?;
        }
        self.bounds.first = covered + 1;
        self.bounds.last = self.bounds.last.max(covered);
        put_encoded(store, BOUNDS_KEY, &self.bounds)?;
        Ok(())
    }

    /// Drop the whole persisted log, keeping only the snapshot boundary.
    /// Used when an installed snapshot does not agree with the local suffix.
    pub fn clear_after(&mut self, index: LogIndex) -> Result<(), ConsensusError> {
        let store = self.store.as_ref();
        for stale in (index + 1).max(self.bounds.first)..=self.bounds.last {
            store.delete(&entry_key(stale))?;
        }
        self.bounds.last = index.max(self.bounds.first.saturating_sub(1));
        put_encoded(store, BOUNDS_KEY, &self.bounds)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::infrastructure::InMemoryKeyValueStore;

    fn storage() -> (Arc<InMemoryKeyValueStore>, LogStorage) {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let mut storage = LogStorage::new(store.clone());
        storage.load().unwrap();
        (store, storage)
    }

    #[test]
    fn test_hard_state_and_entries_survive_reload() {
        let (store, mut storage) = storage();
        storage
            .save_hard_state(&HardState {
                term: 3,
                voted_for: Some(NodeId::from("n2")),
            })
            .unwrap();
        storage
            .write_suffix(&[
                LogEntry::command(1, 1, vec![1]),
                LogEntry::command(3, 2, vec![2]),
            ])
            .unwrap();

        let recovered = LogStorage::new(store).load().unwrap();
        assert_eq!(recovered.hard_state.term, 3);
        assert_eq!(recovered.hard_state.voted_for, Some(NodeId::from("n2")));
        assert_eq!(recovered.entries.len(), 2);
        assert_eq!(recovered.entries[1].term, 3);
    }

    #[test]
    fn test_overwritten_suffix_removes_stale_entries() {
        let (store, mut storage) = storage();
        storage
            .write_suffix(&[
                LogEntry::command(1, 1, vec![1]),
                LogEntry::command(1, 2, vec![2]),
                LogEntry::command(1, 3, vec![3]),
            ])
            .unwrap();
        storage
            .write_suffix(&[LogEntry::command(2, 2, vec![9])])
            .unwrap();

        let recovered = LogStorage::new(store).load().unwrap();
        let terms: Vec<_> = recovered.entries.iter().map(|e| e.term).collect();
        assert_eq!(terms, vec![1, 2]);
    }

    #[test]
    fn test_snapshot_replaces_covered_entries() {
        let (store, mut storage) = storage();
        let entries: Vec<_> = (1..=5).map(|i| LogEntry::command(1, i, vec![i as u8])).collect();
        storage.write_suffix(&entries).unwrap();
        storage
            .save_snapshot(&Snapshot {
                last_included_index: 3,
                last_included_term: 1,
                data: b"state".to_vec(),
            })
            .unwrap();

        let recovered = LogStorage::new(store).load().unwrap();
        assert_eq!(recovered.snapshot.unwrap().data, b"state".to_vec());
        let indices: Vec<_> = recovered.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![4, 5]);
    }
}

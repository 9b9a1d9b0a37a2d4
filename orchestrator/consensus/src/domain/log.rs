// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Replicated Log
//!
//! Ordered entries `(term, index, value)` with a compacted prefix.
//!
//! ## Invariants
//!
//! - Indices are contiguous: `entries[i].index == snapshot_index + 1 + i`.
//! - `commit_index` never decreases and never exceeds `last_index()`.
//! - Entries at or below `commit_index` are never truncated.
//! - Entries at or below `snapshot_index` exist only as a snapshot.

use crate::domain::error::ConsensusError;
use aegis_core::{LogIndex, Term};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogValue {
    /// Appended by a new leader so that entries from earlier terms can commit.
    Noop,
    Command(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: Term,
    pub index: LogIndex,
    pub value: LogValue,
    /// Local view only; always sent as `false` on the wire.
    #[serde(default)]
    pub committed: bool,
}

impl LogEntry {
    pub fn command(term: Term, index: LogIndex, command: Vec<u8>) -> Self {
        Self {
            term,
            index,
            value: LogValue::Command(command),
            committed: false,
        }
    }

    pub fn noop(term: Term, index: LogIndex) -> Self {
        Self {
            term,
            index,
            value: LogValue::Noop,
            committed: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplicatedLog {
    snapshot_index: LogIndex,
    snapshot_term: Term,
    entries: Vec<LogEntry>,
    commit_index: LogIndex,
}

impl ReplicatedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted parts. `entries` must continue directly after
    /// the snapshot; anything that does not is dropped.
    pub fn restore(snapshot_index: LogIndex, snapshot_term: Term, entries: Vec<LogEntry>) -> Self {
        let mut log = Self {
            snapshot_index,
            snapshot_term,
            entries: Vec::with_capacity(entries.len()),
            commit_index: snapshot_index,
        };
        for mut entry in entries {
            if entry.index != log.last_index() + 1 {
                break;
            }
            entry.committed = false;
            log.entries.push(entry);
        }
        log
    }

    pub fn snapshot_index(&self) -> LogIndex {
        self.snapshot_index
    }

    pub fn snapshot_term(&self) -> Term {
        self.snapshot_term
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn first_index(&self) -> LogIndex {
        self.snapshot_index + 1
    }

    pub fn last_index(&self) -> LogIndex {
        self.snapshot_index + self.entries.len() as u64
    }

    pub fn last_term(&self) -> Term {
        self.entries
            .last()
            .map(|e| e.term)
            .unwrap_or(self.snapshot_term)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, index: LogIndex) -> Option<usize> {
        if index <= self.snapshot_index || index > self.last_index() {
            return None;
        }
        Some((index - self.snapshot_index - 1) as usize)
    }

    /// Term of the entry at `index`. Index 0 and the snapshot boundary are
    /// answerable; compacted entries below the boundary are not.
    pub fn term_at(&self, index: LogIndex) -> Option<Term> {
        if index == 0 {
            return Some(0);
        }
        if index == self.snapshot_index {
            return Some(self.snapshot_term);
        }
        self.position(index).map(|pos| self.entries[pos].term)
    }

    pub fn entry(&self, index: LogIndex) -> Option<&LogEntry> {
        self.position(index).map(|pos| &self.entries[pos])
    }

    /// Up to `max` entries starting at `start`, with the committed flag
    /// cleared for transmission.
    pub fn entries_from(&self, start: LogIndex, max: usize) -> Vec<LogEntry> {
        let Some(pos) = self.position(start) else {
            return Vec::new();
        };
        self.entries[pos..]
            .iter()
            .take(max)
            .cloned()
            .map(|mut e| {
                e.committed = false;
                e
            })
            .collect()
    }

    /// Leader-side append of a fresh entry.
    pub fn append(&mut self, term: Term, value: LogValue) -> LogIndex {
        let index = self.last_index() + 1;
        self.entries.push(LogEntry {
            term,
            index,
            value,
            committed: false,
        });
        index
    }

    /// Whether the log contains an entry at `index` with `term`.
    pub fn matches(&self, index: LogIndex, term: Term) -> bool {
        self.term_at(index) == Some(term)
    }

    /// First index still held for the term of the entry at `index`, used as
    /// the conflict hint in a rejected append.
    pub fn first_index_of_term(&self, index: LogIndex) -> LogIndex {
        let Some(term) = self.term_at(index) else {
            return self.last_index() + 1;
        };
        let mut first = index;
        while first > self.first_index() && self.term_at(first - 1) == Some(term) {
            first -= 1;
        }
        first.max(self.commit_index + 1)
    }

    /// Follower-side merge of entries received from the leader. Existing
    /// entries with the same index and term are kept; the first conflicting
    /// entry truncates the suffix. Returns the index of the first entry that
    /// was written, if any.
    pub fn merge(&mut self, entries: Vec<LogEntry>) -> Result<Option<LogIndex>, ConsensusError> {
        let mut first_written = None;
        for mut entry in entries {
            if entry.index <= self.snapshot_index {
                continue;
            }
            match self.term_at(entry.index) {
                Some(term) if term == entry.term => continue,
                Some(_) => self.truncate_from(entry.index)?,
                None => {}
            }
            if entry.index != self.last_index() + 1 {
                return Err(ConsensusError::LogGap {
                    expected: self.last_index() + 1,
                    actual: entry.index,
                });
            }
            entry.committed = false;
            first_written.get_or_insert(entry.index);
            self.entries.push(entry);
        }
        Ok(first_written)
    }

    /// Drop every entry at or after `index`.
    pub fn truncate_from(&mut self, index: LogIndex) -> Result<(), ConsensusError> {
        if index <= self.commit_index {
            return Err(ConsensusError::CommittedTruncation {
                index,
                commit_index: self.commit_index,
            });
        }
        if let Some(pos) = self.position(index) {
            self.entries.truncate(pos);
        }
        Ok(())
    }

    /// Advance the commit index. Returns whether it moved.
    pub fn commit_to(&mut self, index: LogIndex) -> bool {
        let target = index.min(self.last_index());
        if target <= self.commit_index {
            return false;
        }
        for idx in (self.commit_index + 1).max(self.first_index())..=target {
            if let Some(pos) = self.position(idx) {
                self.entries[pos].committed = true;
            }
        }
        self.commit_index = target;
        true
    }

    /// Discard entries up to and including `index`, which becomes the new
    /// snapshot boundary. Only committed entries may be compacted.
    pub fn compact(&mut self, index: LogIndex) -> Result<(), ConsensusError> {
        if index > self.commit_index {
            return Err(ConsensusError::UncommittedCompaction {
                index,
                commit_index: self.commit_index,
            });
        }
        if index <= self.snapshot_index {
            return Ok(());
        }
        let term = self.term_at(index).unwrap_or(self.snapshot_term);
        if let Some(pos) = self.position(index) {
            self.entries.drain(..=pos);
        }
        self.snapshot_index = index;
        self.snapshot_term = term;
        Ok(())
    }

    /// Replace the log prefix with a snapshot received from the leader. A
    /// suffix that agrees with the snapshot boundary is retained.
    pub fn install_snapshot(&mut self, index: LogIndex, term: Term) {
        if self.matches(index, term) && index <= self.last_index() {
            if let Some(pos) = self.position(index) {
                self.entries.drain(..=pos);
            }
        } else {
            self.entries.clear();
        }
        self.snapshot_index = index;
        self.snapshot_term = term;
        self.commit_index = self.commit_index.max(index);
    }
}

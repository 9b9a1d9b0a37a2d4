// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The two volatile memory tiers.
//!
//! The immediate tier is a bounded LRU; whatever it evicts is handed back to
//! the caller so it can cascade into the short-term tier. The short-term
//! tier keeps entries until their TTL passes. Both tiers use
//! `tokio::time::Instant` so expiry follows a paused test clock.

use crate::domain::memory::{MemoryEntry, MemoryKey};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

pub struct ImmediateTier {
    cache: LruCache<MemoryKey, MemoryEntry>,
}

impl ImmediateTier {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Insert or replace. Returns the least-recently-used entry if one was evicted.
    pub fn put(&mut self, entry: MemoryEntry) -> Option<MemoryEntry> {
        let key = entry.key.clone();
        match self.cache.push(key.clone(), entry) {
            Some((evicted_key, evicted)) if evicted_key != key => Some(evicted),
            _ => None,
        }
    }

    /// Read and mark as most recently used.
    pub fn touch(&mut self, key: &MemoryKey) -> Option<&MemoryEntry> {
        self.cache.get(key)
    }

    pub fn peek(&self, key: &MemoryKey) -> Option<&MemoryEntry> {
        self.cache.peek(key)
    }

    pub fn remove(&mut self, key: &MemoryKey) -> Option<MemoryEntry> {
        self.cache.pop(key)
    }

    /// Most recently used first.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.cache.iter().map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

pub struct ShortTermTier {
    ttl: Duration,
    entries: HashMap<MemoryKey, (MemoryEntry, Instant)>,
}

impl ShortTermTier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Insert with a fresh TTL.
    pub fn insert(&mut self, entry: MemoryEntry, now: Instant) {
        self.entries
            .insert(entry.key.clone(), (entry, now + self.ttl));
    }

    /// Replace the value of a present entry, keeping its expiry.
    /// Returns `false` when the key is not in this tier.
    pub fn replace(&mut self, entry: MemoryEntry) -> bool {
        match self.entries.get_mut(&entry.key) {
            Some(slot) => {
                slot.0 = entry;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &MemoryKey, now: Instant) -> Option<&MemoryEntry> {
        self.entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(entry, _)| entry)
    }

    pub fn contains(&self, key: &MemoryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &MemoryKey) -> Option<MemoryEntry> {
        self.entries.remove(key).map(|(entry, _)| entry)
    }

    /// Drop and return every entry whose TTL has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<MemoryEntry> {
        let expired: Vec<MemoryKey> = self
            .entries
            .iter()
            .filter(|(_, (_, expires_at))| *expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|key| self.remove(&key))
            .collect()
    }

    pub fn iter(&self, now: Instant) -> impl Iterator<Item = &MemoryEntry> {
        self.entries
            .values()
            .filter(move |(_, expires_at)| *expires_at > now)
            .map(|(entry, _)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

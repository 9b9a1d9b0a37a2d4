// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Durable copy of the pending queue.
//!
//! The whole queue is written under one key after every change; queues are
//! short-lived and small compared with the cost of a partial rewrite scheme.

use crate::domain::queue::QueuedTask;
use aegis_core::domain::persistence::{get_decoded, put_encoded};
use aegis_core::{KeyValueStore, StorageError};
use std::sync::Arc;
use tracing::debug;

const QUEUE_KEY: &str = "swarm/queue";

pub struct QueueStore {
    store: Arc<dyn KeyValueStore>,
}

impl QueueStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn save(&self, tasks: &[QueuedTask]) -> Result<(), StorageError> {
        put_encoded(self.store.as_ref(), QUEUE_KEY, &tasks)?;
        debug!(queued = tasks.len(), "Persisted pending queue");
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<QueuedTask>, StorageError> {
        Ok(get_decoded(self.store.as_ref(), QUEUE_KEY)?.unwrap_or_default())
    }
}

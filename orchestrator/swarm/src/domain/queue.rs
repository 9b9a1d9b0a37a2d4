// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pending tasks ordered by priority (highest first), FIFO within equal
//! priority.

use crate::domain::task::{FailureRecord, Task};
use aegis_core::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// A task waiting for an eligible agent, with the retry state it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task: Task,
    pub retry_count: u32,
    pub failures: Vec<FailureRecord>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn fresh(task: Task) -> Self {
        Self {
            task,
            retry_count: 0,
            failures: Vec::new(),
            enqueued_at: Utc::now(),
        }
    }
}

type QueueKey = (Reverse<i32>, u64);

#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: BTreeMap<QueueKey, QueuedTask>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, queued: QueuedTask) {
        let key = (Reverse(queued.task.priority), self.next_seq);
        self.next_seq += 1;
        self.entries.insert(key, queued);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.entries.values().any(|q| q.task.id == *task_id)
    }

    /// Queued tasks in the order they will be offered to agents.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedTask> {
        self.entries.values()
    }

    /// Remove and return the first task (in queue order) accepted by `pick`.
    pub fn take_first(&mut self, mut pick: impl FnMut(&QueuedTask) -> bool) -> Option<QueuedTask> {
        let key = *self.entries.iter().find(|(_, q)| pick(q))?.0;
        self.entries.remove(&key)
    }

    pub fn remove(&mut self, task_id: &TaskId) -> Option<QueuedTask> {
        self.take_first(|q| q.task.id == *task_id)
    }

    /// Queue contents in order, for persistence.
    pub fn to_vec(&self) -> Vec<QueuedTask> {
        self.entries.values().cloned().collect()
    }

    /// Rebuild from a persisted, already ordered list.
    pub fn from_vec(tasks: Vec<QueuedTask>) -> Self {
        let mut queue = Self::new();
        for queued in tasks {
            queue.push(queued);
        }
        queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(priority: i32, tag: u8) -> QueuedTask {
        QueuedTask::fresh(Task::new(vec![tag]).with_priority(priority))
    }

    fn order(queue: &TaskQueue) -> Vec<u8> {
        queue.iter().map(|q| q.task.payload[0]).collect()
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = TaskQueue::new();
        queue.push(queued(0, 1));
        queue.push(queued(5, 2));
        queue.push(queued(0, 3));
        queue.push(queued(5, 4));
        queue.push(queued(-1, 5));
        assert_eq!(order(&queue), vec![2, 4, 1, 3, 5]);
    }

    #[test]
    fn test_take_first_skips_rejected() {
        let mut queue = TaskQueue::new();
        queue.push(queued(9, 1));
        queue.push(queued(1, 2));
        let taken = queue.take_first(|q| q.task.payload[0] == 2).unwrap();
        assert_eq!(taken.task.payload, vec![2]);
        assert_eq!(order(&queue), vec![1]);
        assert!(queue.take_first(|_| false).is_none());
    }

    #[test]
    fn test_rebuilt_queue_keeps_order() {
        let mut queue = TaskQueue::new();
        for (priority, tag) in [(1, 1), (3, 2), (1, 3)] {
            queue.push(queued(priority, tag));
        }
        let rebuilt = TaskQueue::from_vec(queue.to_vec());
        assert_eq!(order(&rebuilt), order(&queue));
        assert!(rebuilt.contains(&queue.to_vec()[0].task.id));
    }
}

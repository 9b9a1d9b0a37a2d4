// Event Bus Implementation - Pub/Sub for Mesh Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Observers such as telemetry collectors and tests subscribe;
// components publish without knowing who listens.
//
// Events are not persisted: a subscriber only sees events published after it
// subscribed, and a slow subscriber loses the oldest events first.
//
// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::events::{AgentLifecycleEvent, ConsensusEvent, MemoryEvent, TaskEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Unified event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshEvent {
    AgentLifecycle(AgentLifecycleEvent),
    Task(TaskEvent),
    Consensus(ConsensusEvent),
    Memory(MemoryEvent),
}

/// Event bus for publishing and subscribing to mesh events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<MeshEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_agent_event(&self, event: AgentLifecycleEvent) {
        self.publish(MeshEvent::AgentLifecycle(event));
    }

    pub fn publish_task_event(&self, event: TaskEvent) {
        self.publish(MeshEvent::Task(event));
    }

    pub fn publish_consensus_event(&self, event: ConsensusEvent) {
        self.publish(MeshEvent::Consensus(event));
    }

    pub fn publish_memory_event(&self, event: MemoryEvent) {
        self.publish(MeshEvent::Memory(event));
    }

    fn publish(&self, event: MeshEvent) {
        trace!("Publishing event: {:?}", event);

        // send() only fails when there are no receivers
        if self.sender.send(event).is_err() {
            trace!("No subscribers listening to event");
        }
    }

    /// Subscribe to all mesh events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for all mesh events
pub struct EventReceiver {
    receiver: broadcast::Receiver<MeshEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<MeshEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<MeshEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<MeshEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{AgentId, TaskId};
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let agent_id = AgentId::new();
        event_bus.publish_agent_event(AgentLifecycleEvent::AgentSpawned {
            agent_id,
            kind: "coder".to_string(),
            spawned_at: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        match received {
            MeshEvent::AgentLifecycle(AgentLifecycleEvent::AgentSpawned { agent_id: id, .. }) => {
                assert_eq!(id, agent_id);
            }
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish_task_event(TaskEvent::TaskQueued {
            task_id: TaskId::new(),
            priority: 5,
            queued_at: Utc::now(),
        });

        // Both receivers should get the event
        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let event_bus = EventBus::default();
        event_bus.publish_memory_event(MemoryEvent::EntriesExpired {
            count: 3,
            expired_at: Utc::now(),
        });
        assert_eq!(event_bus.subscriber_count(), 0);
    }

    #[test]
    fn test_drain_collects_buffered_events() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.subscribe();
        for count in 0..3 {
            event_bus.publish_memory_event(MemoryEvent::EntriesExpired {
                count,
                expired_at: Utc::now(),
            });
        }
        assert_eq!(receiver.drain().len(), 3);
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}

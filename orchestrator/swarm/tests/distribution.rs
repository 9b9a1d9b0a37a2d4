// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task placement: eligibility, selection, capacity and queueing.

use aegis_core::domain::events::{AgentLifecycleEvent, TaskEvent};
use aegis_core::domain::node_config::{SelectionPolicy, SwarmConfig, Topology};
use aegis_core::infrastructure::{EventBus, MeshEvent};
use aegis_core::{AgentId, NodeId};
use aegis_swarm::{
    Affinity, AgentSpec, AgentState, Distribution, SwarmError, SwarmOrchestrator, Task,
    TaskAssignment,
};

fn swarm(config: SwarmConfig) -> SwarmOrchestrator {
    SwarmOrchestrator::new(NodeId::from("node-1"), config)
}

async fn ready(swarm: &SwarmOrchestrator, spec: AgentSpec) -> AgentId {
    let id = swarm.spawn(spec).unwrap();
    assert_eq!(swarm.heartbeat(&id).await.unwrap(), AgentState::Ready);
    id
}

fn assigned(distribution: Distribution) -> TaskAssignment {
    match distribution {
        Distribution::Assigned(assignment) => assignment,
        Distribution::Queued { reason, .. } => panic!("task was queued: {reason}"),
    }
}

#[tokio::test]
async fn test_review_task_is_assigned_to_reviewer() {
    let swarm = swarm(SwarmConfig::default());
    let _coder = ready(&swarm, AgentSpec::new("coder").with_capability("coder")).await;
    let reviewer = ready(&swarm, AgentSpec::new("reviewer").with_capability("review")).await;

    let assignment = assigned(
        swarm
            .distribute(Task::new(b"pr-42".to_vec()).requiring("review"))
            .await
            .unwrap(),
    );
    assert_eq!(assignment.agent_id, reviewer);
    assert_eq!(assignment.retry_count, 0);
    assert_eq!(swarm.assignments_for(&reviewer), vec![assignment]);
}

#[tokio::test]
async fn test_spawn_beyond_capacity_is_rejected() {
    let swarm = swarm(SwarmConfig {
        max_agents: 2,
        ..SwarmConfig::default()
    });
    swarm.spawn(AgentSpec::new("coder")).unwrap();
    let second = swarm.spawn(AgentSpec::new("coder")).unwrap();

    assert!(matches!(
        swarm.spawn(AgentSpec::new("coder")),
        Err(SwarmError::CapacityExceeded { max_agents: 2 })
    ));

    swarm.despawn(&second).await.unwrap();
    assert!(swarm.spawn(AgentSpec::new("coder")).is_ok());
}

#[tokio::test]
async fn test_initializing_agent_receives_nothing() {
    let swarm = swarm(SwarmConfig::default());
    let agent = swarm.spawn(AgentSpec::new("coder")).unwrap();

    let queued = swarm.distribute(Task::new(Vec::new())).await.unwrap();
    assert!(matches!(queued, Distribution::Queued { .. }));

    // first heartbeat makes the agent ready and hands it the queued task
    assert_eq!(swarm.heartbeat(&agent).await.unwrap(), AgentState::Busy);
    assert_eq!(swarm.assignment(&queued.task_id()).unwrap().agent_id, agent);
}

#[tokio::test]
async fn test_queue_drains_by_priority_then_fifo() {
    let swarm = swarm(SwarmConfig::default());
    let agent = ready(&swarm, AgentSpec::new("coder").with_capability("code")).await;
    let blocker = assigned(swarm.distribute(Task::new(Vec::new())).await.unwrap());
    assert_eq!(swarm.agent(&agent).unwrap().state, AgentState::Busy);

    let low = Task::new(b"low".to_vec()).requiring("code").with_priority(1);
    let high_a = Task::new(b"high-a".to_vec()).requiring("code").with_priority(5);
    let high_b = Task::new(b"high-b".to_vec()).requiring("code").with_priority(5);
    let ids = [low.id, high_a.id, high_b.id];
    for task in [low, high_a, high_b] {
        let distribution = swarm.distribute(task).await.unwrap();
        match distribution {
            Distribution::Queued { reason, .. } => assert!(reason.contains("busy")),
            other => panic!("expected queueing, got {other:?}"),
        }
    }
    assert_eq!(swarm.queued(), vec![ids[1], ids[2], ids[0]]);

    let mut order = Vec::new();
    swarm.complete(&blocker.task_id).await.unwrap();
    for _ in 0..3 {
        let current = swarm.assignments_for(&agent);
        assert_eq!(current.len(), 1);
        order.push(current[0].task_id);
        swarm.complete(&current[0].task_id).await.unwrap();
    }
    assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
    assert!(swarm.queued().is_empty());
    assert_eq!(swarm.agent(&agent).unwrap().state, AgentState::Ready);
}

#[tokio::test]
async fn test_disabled_queueing_rejects_with_reason() {
    let swarm = swarm(SwarmConfig {
        queueing_enabled: false,
        ..SwarmConfig::default()
    });
    ready(&swarm, AgentSpec::new("coder").with_capability("code")).await;

    let task = Task::new(Vec::new()).requiring("review");
    let task_id = task.id;
    match swarm.distribute(task).await {
        Err(SwarmError::NoEligibleAgents { task_id: id, reason }) => {
            assert_eq!(id, task_id);
            assert_eq!(reason, "no agent has capability 'review'");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(swarm.queued().is_empty());
}

#[tokio::test]
async fn test_affinity_pins_task_to_labelled_agent() {
    let swarm = swarm(SwarmConfig::default());
    ready(&swarm, AgentSpec::new("trainer").with_label("accelerator", "cpu")).await;
    let gpu = ready(&swarm, AgentSpec::new("trainer").with_label("accelerator", "gpu")).await;

    let task = Task::new(Vec::new()).with_affinity(Affinity::Label {
        key: "accelerator".to_string(),
        value: "gpu".to_string(),
    });
    assert_eq!(assigned(swarm.distribute(task).await.unwrap()).agent_id, gpu);
}

#[tokio::test]
async fn test_round_robin_rotates_over_agents() {
    let swarm = swarm(SwarmConfig {
        selection_policy: SelectionPolicy::RoundRobin,
        default_max_concurrent_tasks: 4,
        ..SwarmConfig::default()
    });
    let a = ready(&swarm, AgentSpec::new("coder")).await;
    let b = ready(&swarm, AgentSpec::new("coder")).await;
    let c = ready(&swarm, AgentSpec::new("coder")).await;

    let mut picks = Vec::new();
    for _ in 0..6 {
        picks.push(assigned(swarm.distribute(Task::new(Vec::new())).await.unwrap()).agent_id);
    }
    assert_eq!(picks, vec![a, b, c, a, b, c]);
}

#[tokio::test]
async fn test_least_loaded_balances_capacity() {
    let swarm = swarm(SwarmConfig {
        default_max_concurrent_tasks: 2,
        ..SwarmConfig::default()
    });
    let a = ready(&swarm, AgentSpec::new("coder")).await;
    let b = ready(&swarm, AgentSpec::new("coder")).await;

    let picks: Vec<AgentId> = {
        let mut picks = Vec::new();
        for _ in 0..4 {
            picks.push(assigned(swarm.distribute(Task::new(Vec::new())).await.unwrap()).agent_id);
        }
        picks
    };
    assert_eq!(picks, vec![a, b, a, b]);
    assert_eq!(swarm.stats().busy, 2);

    let fifth = swarm.distribute(Task::new(Vec::new())).await.unwrap();
    assert!(matches!(fifth, Distribution::Queued { .. }));
}

#[tokio::test]
async fn test_duplicate_submission_is_rejected() {
    let swarm = swarm(SwarmConfig::default());
    ready(&swarm, AgentSpec::new("coder")).await;
    let task = Task::new(Vec::new());
    swarm.distribute(task.clone()).await.unwrap();
    assert!(matches!(
        swarm.distribute(task).await,
        Err(SwarmError::DuplicateTask(_))
    ));
}

#[tokio::test]
async fn test_despawn_moves_in_flight_tasks() {
    let swarm = swarm(SwarmConfig::default());
    let first = ready(&swarm, AgentSpec::new("coder")).await;
    let assignment = assigned(swarm.distribute(Task::new(Vec::new())).await.unwrap());
    assert_eq!(assignment.agent_id, first);
    let second = ready(&swarm, AgentSpec::new("coder")).await;

    let moved = swarm.despawn(&first).await.unwrap();
    assert_eq!(moved, vec![assignment.task_id]);

    let reassigned = swarm.assignment(&assignment.task_id).unwrap();
    assert_eq!(reassigned.agent_id, second);
    assert_eq!(reassigned.retry_count, 0);
    assert!(swarm.agent(&first).is_none());
    assert!(matches!(
        swarm.despawn(&first).await,
        Err(SwarmError::AgentNotFound(_))
    ));
}

#[tokio::test]
async fn test_neighbors_follow_topology() {
    let swarm = swarm(SwarmConfig {
        topology: Topology::Star,
        ..SwarmConfig::default()
    });
    let hub = swarm.spawn(AgentSpec::new("planner")).unwrap();
    let spoke_a = swarm.spawn(AgentSpec::new("coder")).unwrap();
    let spoke_b = swarm.spawn(AgentSpec::new("coder")).unwrap();

    assert_eq!(swarm.neighbors(&hub).unwrap(), vec![spoke_a, spoke_b]);
    assert_eq!(swarm.neighbors(&spoke_b).unwrap(), vec![hub]);
    assert!(matches!(
        swarm.neighbors(&AgentId::new()),
        Err(SwarmError::AgentNotFound(_))
    ));
}

#[tokio::test]
async fn test_lifecycle_events_are_published() {
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let swarm = swarm(SwarmConfig::default()).with_event_bus(bus);

    let agent = ready(&swarm, AgentSpec::new("coder")).await;
    let assignment = assigned(swarm.distribute(Task::new(Vec::new())).await.unwrap());
    swarm.complete(&assignment.task_id).await.unwrap();

    let events = events.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        MeshEvent::AgentLifecycle(AgentLifecycleEvent::AgentSpawned { agent_id, .. }) if *agent_id == agent
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        MeshEvent::AgentLifecycle(AgentLifecycleEvent::AgentStateChanged { from, to, .. })
            if from == "initializing" && to == "ready"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        MeshEvent::Task(TaskEvent::TaskAssigned { task_id, .. }) if *task_id == assignment.task_id
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        MeshEvent::Task(TaskEvent::TaskCompleted { .. })
    )));

    let metrics = swarm.metrics().snapshot();
    assert_eq!(metrics.tasks_assigned, 1);
    assert_eq!(metrics.tasks_completed, 1);
}

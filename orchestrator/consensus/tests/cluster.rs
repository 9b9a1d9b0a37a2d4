// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Three-node clusters on the in-process network, driven by the real async
//! node under a paused clock.

use aegis_consensus::{ConsensusHandle, ConsensusNode, InMemoryNetwork};
use aegis_core::domain::node_config::ConsensusConfig;
use aegis_core::infrastructure::SledKeyValueStore;
use aegis_core::{CommandProposer, KeyValueStore, LogIndex, NodeId, ProposalError, StateMachine};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

/// Keeps `(index, command)` for every applied entry.
#[derive(Clone, Default)]
struct Journal {
    entries: Arc<Mutex<Vec<(LogIndex, Vec<u8>)>>>,
}

impl Journal {
    fn entries(&self) -> Vec<(LogIndex, Vec<u8>)> {
        self.entries.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<Vec<u8>> {
        self.entries().into_iter().map(|(_, c)| c).collect()
    }
}

impl StateMachine for Journal {
    fn apply(&mut self, index: LogIndex, command: &[u8]) -> Vec<u8> {
        self.entries.lock().unwrap().push((index, command.to_vec()));
        Vec::new()
    }

    fn snapshot(&self) -> Vec<u8> {
        bincode::serialize(&*self.entries.lock().unwrap()).unwrap()
    }

    fn restore(&mut self, snapshot: &[u8]) {
        *self.entries.lock().unwrap() = bincode::deserialize(snapshot).unwrap();
    }
}

struct TestCluster {
    network: Arc<InMemoryNetwork>,
    handles: Vec<ConsensusHandle>,
    journals: Vec<Journal>,
}

impl TestCluster {
    fn ids(size: usize) -> Vec<NodeId> {
        (1..=size).map(|i| NodeId::new(format!("node-{i}"))).collect()
    }

    fn start(size: usize) -> Self {
        let network = InMemoryNetwork::new();
        let ids = Self::ids(size);
        let mut handles = Vec::new();
        let mut journals = Vec::new();
        for id in &ids {
            let journal = Journal::default();
            let peers = ids.iter().filter(|p| *p != id).cloned().collect();
            let inbox = network.register(id.clone());
            let node = ConsensusNode::from_config(
                id.clone(),
                peers,
                &ConsensusConfig::default(),
                Box::new(journal.clone()),
                None,
                network.clone(),
                inbox,
            )
            .unwrap();
            let (handle, _task) = node.spawn();
            handles.push(handle);
            journals.push(journal);
        }
        Self {
            network,
            handles,
            journals,
        }
    }

    /// Wait until exactly one node considers itself leader and return its position.
    async fn leader(&self) -> usize {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let leaders: Vec<usize> = (0..self.handles.len())
                .filter(|&i| {
                    let id = self.handles[i].node_id();
                    self.network.is_reachable(id, id) && self.handles[i].is_leader()
                })
                .collect();
            if leaders.len() == 1 {
                return leaders[0];
            }
            assert!(tokio::time::Instant::now() < deadline, "no stable leader");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    async fn wait_applied(&self, position: usize, index: LogIndex) {
        let status = self.handles[position]
            .wait_for(WAIT, |s| s.last_applied >= index)
            .await;
        assert!(status.is_some(), "node {position} never applied {index}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_partitioned_follower_rejoins_and_converges() {
    let cluster = TestCluster::start(3);
    let leader = cluster.leader().await;
    let follower = (leader + 1) % 3;
    let proposer = &cluster.handles[leader];

    for n in 0..3u8 {
        proposer.propose(vec![n]).await.unwrap();
    }

    let isolated = cluster.handles[follower].node_id().clone();
    cluster.network.isolate(&isolated);

    let mut last = 0;
    for n in 3..8u8 {
        last = proposer.propose(vec![n]).await.expect("majority of 2 still commits");
    }
    assert!(cluster.handles[follower].status().commit_index < last);

    cluster.network.heal(&isolated);
    cluster.wait_applied(follower, last).await;

    let expected: Vec<Vec<u8>> = (0..8u8).map(|n| vec![n]).collect();
    for journal in &cluster.journals {
        assert_eq!(journal.commands(), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_partitioned_leader_is_replaced() {
    let cluster = TestCluster::start(3);
    let old = cluster.leader().await;
    let old_id = cluster.handles[old].node_id().clone();
    cluster.handles[old].propose(b"before".to_vec()).await.unwrap();

    cluster.network.isolate(&old_id);
    let lost = cluster.handles[old].propose_once(b"lost".to_vec()).await;
    assert!(matches!(lost, Err(ProposalError::NotCommitted(_))));

    let new = cluster.leader().await;
    assert_ne!(new, old);
    let index = cluster.handles[new].propose(b"after".to_vec()).await.unwrap();

    cluster.network.heal(&old_id);
    cluster.wait_applied(old, index).await;
    assert!(!cluster.handles[old].is_leader());

    let expected = vec![b"before".to_vec(), b"after".to_vec()];
    for journal in &cluster.journals {
        assert_eq!(journal.commands(), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_commit_order_follows_leader_append_order() {
    let cluster = TestCluster::start(3);
    let leader = cluster.leader().await;
    let proposer = cluster.handles[leader].clone();

    let proposals = (0..20u8).map(|n| {
        let proposer = proposer.clone();
        async move { (vec![n], proposer.propose(vec![n]).await.unwrap()) }
    });
    let mut accepted = join_all(proposals).await;
    accepted.sort_by_key(|(_, index)| *index);
    let last = accepted.last().unwrap().1;

    for position in 0..3 {
        cluster.wait_applied(position, last).await;
        let applied = cluster.journals[position].entries();
        let expected: Vec<(LogIndex, Vec<u8>)> =
            accepted.iter().map(|(c, i)| (*i, c.clone())).collect();
        assert_eq!(applied, expected, "node {position} applied out of order");
    }
}

#[tokio::test(start_paused = true)]
async fn test_follower_forwards_proposals_to_leader() {
    let cluster = TestCluster::start(3);
    let leader = cluster.leader().await;
    let follower = (leader + 2) % 3;
    cluster.handles[follower]
        .wait_for(WAIT, |s| s.leader.is_some())
        .await
        .unwrap();

    let index = cluster.handles[follower]
        .propose(b"via-follower".to_vec())
        .await
        .unwrap();
    cluster.wait_applied(leader, index).await;
    assert_eq!(
        cluster.journals[leader].commands(),
        vec![b"via-follower".to_vec()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_durable_node_restarts_with_its_log() {
    let dir = tempfile::tempdir().unwrap();
    let id = NodeId::from("durable");
    let config = ConsensusConfig::default();

    let start = |journal: Journal| {
        let network = InMemoryNetwork::new();
        let inbox = network.register(id.clone());
        let store: Arc<dyn KeyValueStore> =
            Arc::new(SledKeyValueStore::open(dir.path().join("raft")).unwrap());
        ConsensusNode::from_config(
            id.clone(),
            Vec::new(),
            &config,
            Box::new(journal),
            Some(store),
            network,
            inbox,
        )
        .unwrap()
        .spawn()
    };

    let first = Journal::default();
    let (handle, task) = start(first.clone());
    handle.wait_for_leader(WAIT).await.unwrap();
    handle.propose(b"one".to_vec()).await.unwrap();
    let index = handle.propose(b"two".to_vec()).await.unwrap();
    let term = handle.status().term;
    handle.shutdown();
    task.await.unwrap();

    let second = Journal::default();
    let (handle, _task) = start(second.clone());
    let status = handle
        .wait_for(WAIT, |s| s.last_applied >= index)
        .await
        .expect("log replayed after re-election");
    assert!(status.term > term);
    assert_eq!(second.commands(), first.commands());
}

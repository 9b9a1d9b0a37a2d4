// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Anti-entropy between memory synchronizers over in-process peers.

use aegis_core::domain::node_config::MemoryConfig;
use aegis_core::NodeId;
use aegis_cortex::domain::{
    ChangeSet, MemoryKey, MemoryValue, Namespace, PeerError, StoreOptions, SyncOutcome, SyncPeer,
};
use aegis_cortex::{LocalPeer, MemorySynchronizer};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

fn synchronizer(id: &str) -> Arc<MemorySynchronizer> {
    let config = MemoryConfig {
        embedding_dimensions: 64,
        sync_peer_timeout: Duration::from_millis(200),
        ..MemoryConfig::default()
    };
    Arc::new(MemorySynchronizer::with_hashing_embedder(NodeId::from(id), config).unwrap())
}

fn peer(memory: &Arc<MemorySynchronizer>) -> Arc<dyn SyncPeer> {
    Arc::new(LocalPeer::new(memory.clone()))
}

/// Never answers.
struct SilentPeer(NodeId);

#[async_trait]
impl SyncPeer for SilentPeer {
    fn node_id(&self) -> NodeId {
        self.0.clone()
    }

    async fn pull_changes(&self, _since: u64) -> Result<ChangeSet, PeerError> {
        std::future::pending().await
    }

    async fn push_changes(&self, _from: NodeId, _changes: ChangeSet) -> Result<Vec<MemoryKey>, PeerError> {
        std::future::pending().await
    }
}

struct DownPeer(NodeId);

#[async_trait]
impl SyncPeer for DownPeer {
    fn node_id(&self) -> NodeId {
        self.0.clone()
    }

    async fn pull_changes(&self, _since: u64) -> Result<ChangeSet, PeerError> {
        Err(PeerError::Unreachable(self.0.clone()))
    }

    async fn push_changes(&self, _from: NodeId, _changes: ChangeSet) -> Result<Vec<MemoryKey>, PeerError> {
        Err(PeerError::Unreachable(self.0.clone()))
    }
}

#[tokio::test]
async fn test_concurrent_writes_converge_with_one_conflict_per_side() {
    let a = synchronizer("node-a");
    let b = synchronizer("node-b");
    let key = MemoryKey::new("agents", "K");

    a.store(key.clone(), MemoryValue::text("written on a"), StoreOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    b.store(key.clone(), MemoryValue::text("written on b"), StoreOptions::default())
        .await
        .unwrap();

    let report = a.sync(&[peer(&b)]).await;
    assert_eq!(report.outcome(), SyncOutcome::Complete);
    assert_eq!(report.conflicts, vec![key.clone()]);

    let ns = Namespace::from("agents");
    let on_a = a.get(&ns, &key).unwrap().unwrap();
    let on_b = b.get(&ns, &key).unwrap().unwrap();
    assert_eq!(on_a, on_b);
    assert_eq!(on_a.value, MemoryValue::text("written on b"));
    assert_eq!(on_a.version.get(&NodeId::from("node-a")), 1);
    assert_eq!(on_a.version.get(&NodeId::from("node-b")), 1);

    // nothing new on either side: the version vector must not move
    let again = a.sync(&[peer(&b)]).await;
    assert!(again.conflicts.is_empty());
    assert_eq!(again.entries_applied, 0);
    assert_eq!(a.get(&ns, &key).unwrap().unwrap().version, on_a.version);
    assert_eq!(b.get(&ns, &key).unwrap().unwrap().version, on_a.version);
}

#[tokio::test]
async fn test_sync_propagates_new_keys_both_ways() {
    let a = synchronizer("node-a");
    let b = synchronizer("node-b");
    a.store(MemoryKey::new("ns", "from-a"), MemoryValue::Counter(1), StoreOptions::default())
        .await
        .unwrap();
    b.store(MemoryKey::new("ns", "from-b"), MemoryValue::Counter(2), StoreOptions::default())
        .await
        .unwrap();

    let report = a.sync(&[peer(&b)]).await;
    assert!(report.conflicts.is_empty());
    assert_eq!(report.entries_applied, 1);

    let ns = Namespace::from("ns");
    assert!(a.get(&ns, &MemoryKey::new("ns", "from-b")).unwrap().is_some());
    assert!(b.get(&ns, &MemoryKey::new("ns", "from-a")).unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failing_peers_yield_partial_result_and_keep_healthy_state() {
    let a = synchronizer("node-a");
    let b = synchronizer("node-b");
    b.store(MemoryKey::new("ns", "k"), MemoryValue::text("v"), StoreOptions::default())
        .await
        .unwrap();

    let peers: Vec<Arc<dyn SyncPeer>> = vec![
        peer(&b),
        Arc::new(SilentPeer(NodeId::from("node-silent"))),
        Arc::new(DownPeer(NodeId::from("node-down"))),
    ];
    let report = a.sync(&peers).await;

    assert_eq!(report.outcome(), SyncOutcome::Partial);
    assert_eq!(report.synced, vec![NodeId::from("node-b")]);
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().any(|f| matches!(f.error, PeerError::Timeout { .. })));
    assert!(report.failed.iter().any(|f| matches!(f.error, PeerError::Unreachable(_))));

    let applied = a.get(&Namespace::from("ns"), &MemoryKey::new("ns", "k")).unwrap();
    assert_eq!(applied.unwrap().value, MemoryValue::text("v"));
}

#[tokio::test]
async fn test_three_nodes_converge_through_a_hub() {
    let hub = synchronizer("hub");
    let left = synchronizer("left");
    let right = synchronizer("right");
    let key = MemoryKey::new("ns", "shared");

    left.store(key.clone(), MemoryValue::text("left"), StoreOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    right
        .store(key.clone(), MemoryValue::text("right"), StoreOptions::default())
        .await
        .unwrap();

    hub.sync(&[peer(&left), peer(&right)]).await;
    hub.sync(&[peer(&left), peer(&right)]).await;

    let ns = Namespace::from("ns");
    let expected = hub.get(&ns, &key).unwrap().unwrap();
    assert_eq!(expected.value, MemoryValue::text("right"));
    assert_eq!(left.get(&ns, &key).unwrap().unwrap(), expected);
    assert_eq!(right.get(&ns, &key).unwrap().unwrap(), expected);
}

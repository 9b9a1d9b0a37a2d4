// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for an AEGIS Mesh node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Node identity and cluster peers
// - Vector index, consensus, memory and swarm tuning
// - Observability settings
//
// The loaded configuration is treated as immutable for the process lifetime.

use crate::domain::ids::NodeId;
use crate::domain::retry::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "MeshNodeConfig";

/// Upper bound on vector dimensionality accepted by the index.
pub const MAX_DIMENSIONS: usize = 65_536;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "MeshNodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: NodeConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

/// Node configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfigSpec {
    pub node: NodeIdentity,
    pub index: IndexConfig,
    pub consensus: ConsensusConfig,
    pub memory: MemoryConfig,
    pub swarm: SwarmConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Stable cluster member identifier
    pub id: NodeId,

    /// Other voting members of the cluster (excluding this node)
    #[serde(default)]
    pub peers: Vec<NodeId>,
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self {
            id: NodeId::new(format!("node-{}", uuid::Uuid::new_v4())),
            peers: Vec::new(),
        }
    }
}

// ============================================================================
// Vector index
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

/// Compression applied to stored vectors at insertion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationKind {
    None,
    /// IEEE-754 half precision, 2 bytes per component
    Float16,
    /// Symmetric per-vector scale, 1 byte per component
    Int8,
}

/// Index parameters. Set once at index creation; immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub dimensions: usize,
    /// HNSW `M`: links per node on upper layers (`2M` on layer 0)
    pub neighbors_per_node: usize,
    /// HNSW `ef_construction`
    pub construction_search_width: usize,
    /// HNSW `ef_search`
    pub query_search_width: usize,
    /// Maximum number of live vectors
    pub capacity: usize,
    pub metric: DistanceMetric,
    /// Independent graphs, one writer each
    pub shards: usize,
    /// Candidate multiplier used when a metadata filter is applied
    pub filter_expansion: usize,
    pub quantization: QuantizationKind,
    /// Largest absolute per-component round-trip error accepted on insert
    pub quantization_tolerance: f32,
    /// Seed for HNSW level assignment
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            neighbors_per_node: 16,
            construction_search_width: 200,
            query_search_width: 64,
            capacity: 1_000_000,
            metric: DistanceMetric::Cosine,
            shards: 1,
            filter_expansion: 3,
            quantization: QuantizationKind::None,
            quantization_tolerance: 0.01,
            seed: 0x5eed,
        }
    }
}

impl IndexConfig {
    pub fn new(dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            dimensions,
            metric,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions == 0 {
            return Err(ConfigError::InvalidConfig("dimensions must be positive".into()));
        }
        if self.dimensions > MAX_DIMENSIONS {
            return Err(ConfigError::InvalidConfig(format!(
                "dimensions {} exceeds maximum {}",
                self.dimensions, MAX_DIMENSIONS
            )));
        }
        if self.neighbors_per_node == 0 {
            return Err(ConfigError::InvalidConfig(
                "neighbors_per_node must be positive".into(),
            ));
        }
        if self.construction_search_width == 0 || self.query_search_width == 0 {
            return Err(ConfigError::InvalidConfig(
                "search widths must be positive".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(ConfigError::InvalidConfig("capacity must be positive".into()));
        }
        if self.shards == 0 {
            return Err(ConfigError::InvalidConfig("shards must be positive".into()));
        }
        if self.filter_expansion == 0 {
            return Err(ConfigError::InvalidConfig(
                "filter_expansion must be positive".into(),
            ));
        }
        if !(self.quantization_tolerance > 0.0) {
            return Err(ConfigError::InvalidConfig(
                "quantization_tolerance must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Consensus
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    #[serde(with = "humantime_serde")]
    pub election_timeout_min: Duration,
    #[serde(with = "humantime_serde")]
    pub election_timeout_max: Duration,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// How long `propose` waits for a majority before `NotCommitted`
    #[serde(with = "humantime_serde")]
    pub proposal_timeout: Duration,
    pub max_entries_per_append: usize,
    /// Applied entries kept in the log before compaction is attempted
    pub snapshot_threshold: u64,
    /// Internal retries of `NoLeader` / `NotCommitted`
    pub proposal_retry: BackoffPolicy,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            heartbeat_interval: Duration::from_millis(50),
            proposal_timeout: Duration::from_secs(2),
            max_entries_per_append: 64,
            snapshot_threshold: 10_000,
            proposal_retry: BackoffPolicy::new(
                Duration::from_millis(50),
                Duration::from_secs(1),
                3,
            ),
        }
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Resolution of concurrent writes to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Latest wall-clock timestamp wins; ties go to the greater origin node id.
    LastWriteWins,
    /// Mergeable values are merged; everything else falls back to last-write-wins.
    Merge,
}

/// Fixed blend used by semantic retrieval.
///
/// `score = similarity·w_s + recency·w_r + importance·w_i`, where recency is
/// `0.5^(age / recency_half_life)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub similarity: f32,
    pub recency: f32,
    pub importance: f32,
    #[serde(with = "humantime_serde")]
    pub recency_half_life: Duration,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            similarity: 0.6,
            recency: 0.2,
            importance: 0.2,
            recency_half_life: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// LRU capacity of the immediate tier
    pub immediate_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub short_term_ttl: Duration,
    /// Importance above which an entry is promoted to the long-term tier
    pub promotion_threshold: f32,
    pub conflict_strategy: ConflictStrategy,
    pub ranking: RankingWeights,
    #[serde(with = "humantime_serde")]
    pub sync_peer_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub maintenance_interval: Duration,
    /// Dimensionality of the long-term semantic index
    pub embedding_dimensions: usize,
    /// Namespaces whose writes go through the replicated log
    pub strong_namespaces: Vec<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            immediate_capacity: 1024,
            short_term_ttl: Duration::from_secs(15 * 60),
            promotion_threshold: 0.7,
            conflict_strategy: ConflictStrategy::LastWriteWins,
            ranking: RankingWeights::default(),
            sync_peer_timeout: Duration::from_secs(5),
            maintenance_interval: Duration::from_secs(60),
            embedding_dimensions: 256,
            strong_namespaces: Vec::new(),
        }
    }
}

// ============================================================================
// Swarm
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Strict rotation over eligible agents
    RoundRobin,
    /// Fewest in-flight tasks, ties by spawn order
    LeastLoaded,
    /// Probability proportional to the agent's configured weight
    WeightedRandom,
}

/// Neighbour structure used for coordination fan-out between agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Every agent neighbours every other agent
    Mesh,
    /// The first spawned agent is the hub
    Star,
    /// Each agent neighbours its predecessor and successor in spawn order
    Ring,
    /// A tree in spawn order where each agent has up to `fan_out` children
    Hierarchical { fan_out: usize },
}

/// Whether queued tasks survive a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePersistence {
    Memory,
    Durable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub max_agents: usize,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Missed heartbeat intervals before an agent is marked unhealthy
    pub unhealthy_after_missed: u32,
    /// Time spent unhealthy before an agent is reaped
    #[serde(with = "humantime_serde")]
    pub reap_after: Duration,
    pub selection_policy: SelectionPolicy,
    pub queueing_enabled: bool,
    pub queue_persistence: QueuePersistence,
    /// Task retry delays (`max_attempts` is taken from each task)
    pub retry_backoff: BackoffPolicy,
    /// Propose every assignment through the replicated log
    pub consensus_backed: bool,
    pub default_max_concurrent_tasks: usize,
    pub topology: Topology,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_agents: 64,
            heartbeat_interval: Duration::from_secs(5),
            unhealthy_after_missed: 3,
            reap_after: Duration::from_secs(120),
            selection_policy: SelectionPolicy::LeastLoaded,
            queueing_enabled: true,
            queue_persistence: QueuePersistence::Memory,
            retry_backoff: BackoffPolicy::new(
                Duration::from_millis(200),
                Duration::from_secs(30),
                3,
            ),
            consensus_backed: false,
            default_max_concurrent_tasks: 1,
            topology: Topology::Mesh,
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,
    /// Output format ("json" or "compact")
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "aegis-mesh-node".to_string(),
                version: Some("1.0.0".to_string()),
                labels: HashMap::new(),
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_CONFIG_PATH environment variable
    /// 2. ./aegis-mesh.yaml (working directory)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-mesh.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        None
    }

    /// Load configuration with discovery, fallback to default.
    /// The result is validated before it is returned.
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?
        } else if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AEGIS_NODE_ID") {
            if !val.is_empty() {
                tracing::info!("Environment override: AEGIS_NODE_ID={}", val);
                self.spec.node.id = NodeId::new(val);
            }
        }

        if let Ok(val) = std::env::var("AEGIS_LOG_LEVEL") {
            tracing::info!("Environment override: AEGIS_LOG_LEVEL={}", val);
            self.spec.observability.log_level = val;
        }

        if let Ok(val) = std::env::var("AEGIS_MAX_AGENTS") {
            match val.parse::<usize>() {
                Ok(max) => {
                    tracing::info!("Environment override: AEGIS_MAX_AGENTS={}", max);
                    self.spec.swarm.max_agents = max;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for AEGIS_MAX_AGENTS: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.node.id.as_str().is_empty() {
            anyhow::bail!("spec.node.id cannot be empty");
        }

        if self.spec.node.peers.contains(&self.spec.node.id) {
            anyhow::bail!("spec.node.peers must not contain the node itself");
        }

        self.spec.index.validate()?;

        let consensus = &self.spec.consensus;
        if consensus.election_timeout_min >= consensus.election_timeout_max {
            anyhow::bail!("consensus.election_timeout_min must be below election_timeout_max");
        }
        if consensus.heartbeat_interval >= consensus.election_timeout_min {
            anyhow::bail!("consensus.heartbeat_interval must be below election_timeout_min");
        }
        if consensus.max_entries_per_append == 0 {
            anyhow::bail!("consensus.max_entries_per_append must be positive");
        }

        let memory = &self.spec.memory;
        if memory.immediate_capacity == 0 {
            anyhow::bail!("memory.immediate_capacity must be positive");
        }
        if memory.embedding_dimensions == 0 || memory.embedding_dimensions > MAX_DIMENSIONS {
            anyhow::bail!("memory.embedding_dimensions out of range");
        }
        let weights = &memory.ranking;
        if weights.similarity < 0.0 || weights.recency < 0.0 || weights.importance < 0.0 {
            anyhow::bail!("memory.ranking weights must be non-negative");
        }

        let swarm = &self.spec.swarm;
        if swarm.max_agents == 0 {
            anyhow::bail!("swarm.max_agents must be positive");
        }
        if swarm.unhealthy_after_missed == 0 {
            anyhow::bail!("swarm.unhealthy_after_missed must be positive");
        }
        if swarm.default_max_concurrent_tasks == 0 {
            anyhow::bail!("swarm.default_max_concurrent_tasks must be positive");
        }
        if swarm.topology == (Topology::Hierarchical { fan_out: 0 }) {
            anyhow::bail!("swarm.topology fan_out must be positive");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = NodeConfigManifest::default();
        assert_eq!(manifest.api_version, "100monkeys.ai/v1");
        assert_eq!(manifest.kind, "MeshNodeConfig");
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.spec.memory.conflict_strategy, ConflictStrategy::LastWriteWins);
    }

    #[test]
    fn test_yaml_with_human_durations() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: MeshNodeConfig
metadata:
  name: mesh-a
spec:
  node:
    id: node-a
    peers: [node-b, node-c]
  index:
    dimensions: 3
    metric: euclidean
  consensus:
    election_timeout_min: 200ms
    election_timeout_max: 400ms
    heartbeat_interval: 40ms
  swarm:
    selection_policy: round_robin
    queue_persistence: durable
    retry_backoff:
      base: 1s
      max_delay: 1m
      max_attempts: 5
"#;
        let manifest = NodeConfigManifest::from_yaml_str(yaml).unwrap();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.spec.node.peers.len(), 2);
        assert_eq!(manifest.spec.index.dimensions, 3);
        assert_eq!(manifest.spec.index.metric, DistanceMetric::Euclidean);
        // unspecified fields fall back to defaults
        assert_eq!(manifest.spec.index.neighbors_per_node, 16);
        assert_eq!(manifest.spec.consensus.election_timeout_min, Duration::from_millis(200));
        assert_eq!(manifest.spec.swarm.selection_policy, SelectionPolicy::RoundRobin);
        assert_eq!(manifest.spec.swarm.queue_persistence, QueuePersistence::Durable);
        assert_eq!(manifest.spec.swarm.retry_backoff.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let manifest = NodeConfigManifest::default();
        let yaml = serde_yaml::to_string(&manifest).unwrap();
        let parsed = NodeConfigManifest::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.spec.node.id, manifest.spec.node.id);
        assert_eq!(parsed.spec.consensus, manifest.spec.consensus);
        assert_eq!(parsed.spec.swarm, manifest.spec.swarm);
    }

    #[test]
    fn test_validation() {
        let mut manifest = NodeConfigManifest::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.spec.node.peers.push(manifest.spec.node.id.clone());
        assert!(manifest.validate().is_err());
        manifest.spec.node.peers.clear();

        manifest.spec.consensus.heartbeat_interval = Duration::from_secs(1);
        assert!(manifest.validate().is_err());
        manifest.spec.consensus.heartbeat_interval = Duration::from_millis(50);

        manifest.spec.swarm.max_agents = 0;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_index_config_bounds() {
        assert!(IndexConfig::new(0, DistanceMetric::Cosine).validate().is_err());
        assert!(IndexConfig::new(MAX_DIMENSIONS + 1, DistanceMetric::Cosine)
            .validate()
            .is_err());
        assert!(IndexConfig::new(MAX_DIMENSIONS, DistanceMetric::Cosine)
            .validate()
            .is_ok());

        let mut config = IndexConfig::new(8, DistanceMetric::DotProduct);
        config.neighbors_per_node = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidConfig("neighbors_per_node must be positive".into()))
        );
    }
}

//! Client configuration
//!
//! Loaded from TOML (or built in code), validated once, then used to
//! construct the shard cluster, the processor/hasher constructors and the
//! chunk storage strategy.

use crate::pipeline::{HasherConstructor, Pipeline, ProcessorConstructor};
use crate::storage::{ChunkStorage, ErasureStorage, ReplicationStorage, SingleStorage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use stratus_core::{
    BlockHasher, CompressionAlgorithm, CompressionMode, ErasureConfig, HashAlgorithm,
    ProcessorChain, Result, StratusError,
};
use stratus_shard::{DynShard, ShardCluster, SpreadingPolicy, ZdbConfig, ZdbShard};

/// Complete client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Namespace all shards operate in
    pub namespace: String,

    /// The shard cluster, non-empty
    pub shards: Vec<ShardConfig>,

    /// Fallback password for shards that do not carry their own
    #[serde(default)]
    pub password: Option<String>,

    /// Data pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Shard selection policy for placement
    #[serde(default)]
    pub spreading: SpreadingPolicy,

    /// Metadata store settings
    #[serde(default)]
    pub metastor: MetaStoreConfig,
}

/// One shard entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Shard address, `host:port`
    pub address: String,
    /// Namespace override for this shard
    #[serde(default)]
    pub namespace: Option<String>,
    /// Password override for this shard
    #[serde(default)]
    pub password: Option<String>,
}

/// Pipeline settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Block size in bytes; 0 disables splitting
    pub block_size: usize,
    pub compression: CompressionConfig,
    pub encryption: EncryptionConfig,
    pub distribution: DistributionConfig,
    /// Replica count when no distribution is configured; ≤ 1 means single
    pub replication_max: usize,
    pub hash: HashConfig,
    /// Worker parallelism; 0 selects the number of hardware threads
    pub workers: usize,
}

/// Compression stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(rename = "type", default)]
    pub algorithm: CompressionAlgorithm,
    #[serde(default)]
    pub mode: CompressionMode,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Snappy,
            mode: CompressionMode::Disabled,
        }
    }
}

/// Encryption stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    #[serde(rename = "type", default)]
    pub algorithm: EncryptionType,
    /// AES key of 16, 24 or 32 bytes; empty disables encryption
    #[serde(default)]
    pub private_key: String,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            algorithm: EncryptionType::Aes,
            private_key: String::new(),
        }
    }
}

/// Supported encryption algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionType {
    #[default]
    Aes,
}

/// Erasure-coding geometry; `(0, 0)` selects single or replicated storage
/// depending on `replication_max`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub data_shards: usize,
    pub parity_shards: usize,
}

/// Hasher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashConfig {
    #[serde(rename = "type", default)]
    pub algorithm: HashAlgorithm,
    /// Optional hashing key; empty means unkeyed
    #[serde(default)]
    pub key: String,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Blake2b256,
            key: String::new(),
        }
    }
}

/// Metadata store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaStoreConfig {
    pub database: MetaDatabaseConfig,
}

/// Metadata database endpoints (for remote KV engines)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaDatabaseConfig {
    pub endpoints: Vec<String>,
}

/// Storage mode resolved from the distribution settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// One object per chunk, no redundancy
    Single,
    /// N identical replicas per chunk
    Replication(usize),
    /// Reed-Solomon data + parity shares per chunk
    Erasure {
        data_shards: usize,
        parity_shards: usize,
    },
}

impl Config {
    /// Load a configuration from a TOML file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from TOML text and validate it
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| StratusError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, including storage-mode feasibility
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(StratusError::Configuration(
                "namespace is required".to_string(),
            ));
        }
        if self.shards.is_empty() {
            return Err(StratusError::Configuration(
                "at least one shard is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for shard in &self.shards {
            if shard.address.is_empty() {
                return Err(StratusError::Configuration(
                    "shard address is empty".to_string(),
                ));
            }
            if !seen.insert(shard.address.as_str()) {
                return Err(StratusError::Configuration(format!(
                    "duplicate shard address: {}",
                    shard.address
                )));
            }
        }

        let key_len = self.pipeline.encryption.private_key.len();
        if !matches!(key_len, 0 | 16 | 24 | 32) {
            return Err(StratusError::InvalidKeyLength {
                expected: "16, 24 or 32",
                actual: key_len,
            });
        }

        // a hasher construction exercises the hash key constraints
        let hash_key = self.hash_key();
        BlockHasher::with_algorithm(self.pipeline.hash.algorithm, hash_key.as_deref())?;

        self.storage_mode()?;
        Ok(())
    }

    /// Resolve the storage mode from distribution and replication settings:
    /// parity > 0 selects erasure coding, data shards alone select
    /// replication, otherwise `replication_max` decides between replication
    /// and single. Modes that need more shards than are listed are rejected.
    pub fn storage_mode(&self) -> Result<StorageMode> {
        let DistributionConfig {
            data_shards,
            parity_shards,
        } = self.pipeline.distribution;
        let listed = self.shards.len();

        if parity_shards > 0 {
            if data_shards == 0 {
                return Err(StratusError::Configuration(
                    "parity shards configured without data shards".to_string(),
                ));
            }
            if data_shards + parity_shards > listed {
                return Err(StratusError::InvalidInput(format!(
                    "distribution {}+{} needs more shards than the {} listed",
                    data_shards, parity_shards, listed
                )));
            }
            return Ok(StorageMode::Erasure {
                data_shards,
                parity_shards,
            });
        }

        let replicas = if data_shards > 1 {
            data_shards
        } else {
            self.pipeline.replication_max
        };
        if replicas > 1 {
            if replicas > listed {
                return Err(StratusError::InvalidInput(format!(
                    "replication count {} exceeds the {} listed shards",
                    replicas, listed
                )));
            }
            return Ok(StorageMode::Replication(replicas));
        }

        Ok(StorageMode::Single)
    }

    fn hash_key(&self) -> Option<Vec<u8>> {
        let key = &self.pipeline.hash.key;
        (!key.is_empty()).then(|| key.clone().into_bytes())
    }

    /// Constructor for per-worker hashers
    pub fn hasher_constructor(&self) -> HasherConstructor {
        let algorithm = self.pipeline.hash.algorithm;
        let key = self.hash_key();
        Arc::new(move || BlockHasher::with_algorithm(algorithm, key.as_deref()))
    }

    /// Constructor for per-worker processor chains
    pub fn processor_constructor(&self) -> ProcessorConstructor {
        let compression = (
            self.pipeline.compression.algorithm,
            self.pipeline.compression.mode,
        );
        let key = {
            let key = &self.pipeline.encryption.private_key;
            (!key.is_empty()).then(|| key.clone().into_bytes())
        };
        Arc::new(move || ProcessorChain::builder(Some(compression), key.as_deref()))
    }

    /// Build the chunk storage strategy for the resolved mode
    pub fn build_storage(&self, cluster: Arc<ShardCluster>) -> Result<Arc<dyn ChunkStorage>> {
        Ok(match self.storage_mode()? {
            StorageMode::Single => Arc::new(SingleStorage::new(cluster)),
            StorageMode::Replication(replicas) => {
                Arc::new(ReplicationStorage::new(cluster, replicas)?)
            }
            StorageMode::Erasure {
                data_shards,
                parity_shards,
            } => Arc::new(ErasureStorage::new(
                cluster,
                ErasureConfig::new(data_shards, parity_shards)?,
            )?),
        })
    }

    /// Build the data pipeline over an already-connected cluster
    pub fn build_pipeline(&self, cluster: Arc<ShardCluster>) -> Result<Pipeline> {
        let storage = self.build_storage(cluster)?;
        let mut pipeline = Pipeline::new(
            self.pipeline.block_size,
            storage,
            self.hasher_constructor(),
            self.processor_constructor(),
        );
        if self.pipeline.workers > 0 {
            pipeline = pipeline.with_workers(self.pipeline.workers);
        }
        Ok(pipeline)
    }

    /// Connect a 0-db client for every listed shard and assemble the cluster
    pub async fn connect_cluster(&self) -> Result<Arc<ShardCluster>> {
        let mut shards: Vec<DynShard> = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let zdb = ZdbConfig {
                address: shard.address.clone(),
                namespace: shard
                    .namespace
                    .clone()
                    .unwrap_or_else(|| self.namespace.clone()),
                password: shard.password.clone().or_else(|| self.password.clone()),
                ..Default::default()
            };
            shards.push(Arc::new(ZdbShard::connect(zdb).await?));
        }
        Ok(Arc::new(ShardCluster::new(shards, self.spreading)?))
    }
}

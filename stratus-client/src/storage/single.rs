//! Single-object storage: one copy on one shard, loss is fatal

use super::{delete_objects, fetch_object, ChunkConfig, ChunkStorage, CheckStatus};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use stratus_core::{Result, StratusError};
use stratus_metadata::ObjectLocation;
use stratus_shard::{ObjectStatus, ShardClient, ShardCluster};
use tracing::warn;

/// Stores each chunk as exactly one object on one shard
pub struct SingleStorage {
    cluster: Arc<ShardCluster>,
}

impl SingleStorage {
    /// Create a single-object storage over the cluster
    pub fn new(cluster: Arc<ShardCluster>) -> Self {
        Self { cluster }
    }

    fn expect_one<'a>(&self, config: &'a ChunkConfig) -> Result<&'a ObjectLocation> {
        match config.objects.as_slice() {
            [object] => Ok(object),
            other => Err(StratusError::InvalidInput(format!(
                "single storage expects 1 object, got {}",
                other.len()
            ))),
        }
    }
}

#[async_trait]
impl ChunkStorage for SingleStorage {
    async fn write_chunk(&self, data: Bytes) -> Result<ChunkConfig> {
        // walk the iterator until one shard accepts the object
        for shard in self.cluster.iterator(&[]) {
            match shard.put_object(data.clone()).await {
                Ok(key) => {
                    return Ok(ChunkConfig {
                        objects: vec![ObjectLocation {
                            shard_id: shard.identifier().to_string(),
                            key,
                        }],
                    });
                }
                Err(StratusError::NamespaceFull) => return Err(StratusError::NamespaceFull),
                Err(err) => {
                    warn!(shard = shard.identifier(), error = %err, "put failed, trying next shard");
                }
            }
        }
        Err(StratusError::WriteInsufficient {
            placed: 0,
            required: 1,
        })
    }

    async fn read_chunk(&self, config: &ChunkConfig) -> Result<Bytes> {
        let object = self.expect_one(config)?;
        fetch_object(&self.cluster, object).await
    }

    async fn check_chunk(&self, config: &ChunkConfig, _fast: bool) -> Result<CheckStatus> {
        let object = self.expect_one(config)?;
        let Ok(shard) = self.cluster.get(&object.shard_id) else {
            return Ok(CheckStatus::Invalid);
        };
        match shard.object_status(&object.key).await {
            Ok(ObjectStatus::Ok) => Ok(CheckStatus::Optimal),
            Ok(_) => Ok(CheckStatus::Invalid),
            Err(_) => Ok(CheckStatus::Invalid),
        }
    }

    async fn repair_chunk(&self, _config: &ChunkConfig) -> Result<ChunkConfig> {
        Err(StratusError::NotSupported)
    }

    async fn delete_chunk(&self, config: &ChunkConfig) -> Result<()> {
        delete_objects(&self.cluster, &config.objects).await
    }
}

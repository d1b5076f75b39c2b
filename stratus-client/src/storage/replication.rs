//! Replicated storage: R identical objects on R distinct shards

use super::{delete_objects, fetch_object, object_is_ok, ChunkConfig, ChunkStorage, CheckStatus};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use stratus_core::{Result, StratusError};
use stratus_metadata::ObjectLocation;
use stratus_shard::{ObjectStatus, ShardClient, ShardCluster};
use tracing::{debug, warn};

/// Stores each chunk as `replica_count` identical objects, each on its own
/// shard. Any surviving replica suffices to read.
pub struct ReplicationStorage {
    cluster: Arc<ShardCluster>,
    replica_count: usize,
}

impl ReplicationStorage {
    /// Create a replicated storage writing `replica_count` copies
    pub fn new(cluster: Arc<ShardCluster>, replica_count: usize) -> Result<Self> {
        if replica_count < 2 {
            return Err(StratusError::InvalidInput(
                "replication requires at least 2 replicas".to_string(),
            ));
        }
        if replica_count > cluster.listed_count() {
            return Err(StratusError::InvalidInput(format!(
                "replication count {} exceeds listed shard count {}",
                replica_count,
                cluster.listed_count()
            )));
        }
        Ok(Self {
            cluster,
            replica_count,
        })
    }

    /// Put `data` onto fresh shards from `iter` until `placements` holds
    /// `target` objects.
    async fn fill_replicas(
        &self,
        data: &Bytes,
        placements: &mut Vec<ObjectLocation>,
        mut iter: stratus_shard::ShardIterator,
        target: usize,
    ) -> Result<()> {
        while placements.len() < target {
            let missing = target - placements.len();
            let wave: Vec<_> = iter.by_ref().take(missing).collect();
            if wave.len() < missing {
                return Err(StratusError::WriteInsufficient {
                    placed: placements.len(),
                    required: target,
                });
            }

            let puts = wave.into_iter().map(|shard| {
                let data = data.clone();
                async move {
                    let id = shard.identifier().to_string();
                    (id, shard.put_object(data).await)
                }
            });

            for (shard_id, result) in join_all(puts).await {
                match result {
                    Ok(key) => placements.push(ObjectLocation { shard_id, key }),
                    Err(StratusError::NamespaceFull) => return Err(StratusError::NamespaceFull),
                    Err(err) => {
                        warn!(shard = %shard_id, error = %err, "replica put failed, trying further shards");
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkStorage for ReplicationStorage {
    async fn write_chunk(&self, data: Bytes) -> Result<ChunkConfig> {
        let mut placements = Vec::with_capacity(self.replica_count);
        self.fill_replicas(&data, &mut placements, self.cluster.iterator(&[]), self.replica_count)
            .await?;
        Ok(ChunkConfig {
            objects: placements,
        })
    }

    async fn read_chunk(&self, config: &ChunkConfig) -> Result<Bytes> {
        for object in &config.objects {
            match fetch_object(&self.cluster, object).await {
                Ok(data) => return Ok(data),
                Err(err) => {
                    debug!(
                        shard = %object.shard_id,
                        error = %err,
                        "replica unavailable, falling through to the next"
                    );
                }
            }
        }
        Err(StratusError::ReadInsufficient {
            available: 0,
            required: 1,
        })
    }

    async fn check_chunk(&self, config: &ChunkConfig, fast: bool) -> Result<CheckStatus> {
        if fast {
            // first responding replica decides
            for object in &config.objects {
                if object_is_ok(&self.cluster, object).await {
                    return Ok(CheckStatus::Valid);
                }
            }
            return Ok(CheckStatus::Invalid);
        }

        let checks = config
            .objects
            .iter()
            .map(|object| object_is_ok(&self.cluster, object));
        let live = join_all(checks).await.into_iter().filter(|ok| *ok).count();

        Ok(if live == config.objects.len() {
            CheckStatus::Optimal
        } else if live > 0 {
            CheckStatus::Valid
        } else {
            CheckStatus::Invalid
        })
    }

    async fn repair_chunk(&self, config: &ChunkConfig) -> Result<ChunkConfig> {
        // identify surviving replicas
        let mut survivors = Vec::new();
        for object in &config.objects {
            let Ok(shard) = self.cluster.get(&object.shard_id) else {
                continue;
            };
            if matches!(
                shard.object_status(&object.key).await,
                Ok(ObjectStatus::Ok)
            ) {
                survivors.push(object.clone());
            }
        }

        // fetch the data from any survivor
        let mut data = None;
        for object in &survivors {
            match fetch_object(&self.cluster, object).await {
                Ok(bytes) => {
                    data = Some(bytes);
                    break;
                }
                Err(err) => {
                    debug!(shard = %object.shard_id, error = %err, "survivor unreadable during repair");
                }
            }
        }
        let Some(data) = data else {
            return Err(StratusError::AllReplicatesCorrupted);
        };

        // re-put onto fresh shards until the replica count is restored
        let except: Vec<String> = survivors.iter().map(|o| o.shard_id.clone()).collect();
        let mut placements = survivors;
        self.fill_replicas(
            &data,
            &mut placements,
            self.cluster.iterator(&except),
            self.replica_count,
        )
        .await?;

        Ok(ChunkConfig {
            objects: placements,
        })
    }

    async fn delete_chunk(&self, config: &ChunkConfig) -> Result<()> {
        delete_objects(&self.cluster, &config.objects).await
    }
}

//! Chunk storage strategies
//!
//! A [`ChunkStorage`] places one processed block across the cluster and gets
//! it back, according to the configured storage mode:
//! - [`single::SingleStorage`]: one object on one shard, no redundancy
//! - [`replication::ReplicationStorage`]: R identical objects on R shards
//! - [`erasure::ErasureStorage`]: D+P Reed-Solomon shares on D+P shards

pub mod erasure;
pub mod replication;
pub mod single;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use stratus_core::{Result, StratusError};
use stratus_metadata::ObjectLocation;
use stratus_shard::{ShardClient, ShardCluster};
use tracing::warn;

pub use erasure::ErasureStorage;
pub use replication::ReplicationStorage;
pub use single::SingleStorage;

/// Placement of one chunk, as produced by a write and consumed by
/// read/check/repair/delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Objects in placement order; reads try them in this order
    pub objects: Vec<ObjectLocation>,
}

impl ChunkConfig {
    /// Identifiers of the shards used by this placement
    pub fn shard_ids(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.shard_id.clone()).collect()
    }
}

/// Health of one stored chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckStatus {
    /// The chunk cannot be read
    Invalid,
    /// Enough placements remain to read the chunk, but not all of them
    Valid,
    /// Every placement is intact
    Optimal,
}

/// Placement strategy for one chunk
#[async_trait]
pub trait ChunkStorage: Send + Sync {
    /// Disperse one processed block across the cluster
    async fn write_chunk(&self, data: Bytes) -> Result<ChunkConfig>;

    /// Recover the processed block from a recorded placement
    async fn read_chunk(&self, config: &ChunkConfig) -> Result<Bytes>;

    /// Probe the health of a placement. `fast` trades precision for fewer
    /// shard round trips.
    async fn check_chunk(&self, config: &ChunkConfig, fast: bool) -> Result<CheckStatus>;

    /// Restore a degraded placement to full redundancy, returning the
    /// updated placement. Fails with [`StratusError::NotSupported`] for
    /// modes without redundancy.
    async fn repair_chunk(&self, config: &ChunkConfig) -> Result<ChunkConfig>;

    /// Delete every object of a placement. Missing objects are ignored.
    async fn delete_chunk(&self, config: &ChunkConfig) -> Result<()>;
}

/// Delete all objects of a placement concurrently.
///
/// Missing objects are fine (shard deletes are idempotent); the first other
/// failure is returned after all deletes ran.
pub(crate) async fn delete_objects(
    cluster: &ShardCluster,
    objects: &[ObjectLocation],
) -> Result<()> {
    let deletes = objects.iter().map(|object| async move {
        let shard = cluster.get(&object.shard_id)?;
        shard.delete_object(&object.key).await
    });

    let mut first_error = None;
    for result in join_all(deletes).await {
        match result {
            Ok(()) | Err(StratusError::KeyNotFound) => {}
            Err(err) => {
                warn!(error = %err, "failed to delete chunk object");
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

/// Fetch one object, resolving its shard first
pub(crate) async fn fetch_object(
    cluster: &ShardCluster,
    object: &ObjectLocation,
) -> Result<Bytes> {
    let shard = cluster.get(&object.shard_id)?;
    shard.get_object(&object.key).await
}

/// Status of one object, with any shard or transport failure folded into
/// "not OK"
pub(crate) async fn object_is_ok(cluster: &ShardCluster, object: &ObjectLocation) -> bool {
    let Ok(shard) = cluster.get(&object.shard_id) else {
        return false;
    };
    matches!(
        shard.object_status(&object.key).await,
        Ok(stratus_shard::ObjectStatus::Ok)
    )
}

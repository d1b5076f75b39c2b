//! Shard client abstraction
//!
//! A shard is one storage node holding content-addressed objects within a
//! namespace. The data pipeline only ever talks to shards through the
//! [`ShardClient`] trait; the wire protocol behind it is an implementation
//! detail (see [`crate::zdb`] for the 0-db transport and [`crate::memory`]
//! for the in-memory one).

use async_trait::async_trait;
use bytes::Bytes;
use stratus_core::{Result, StratusError};

/// Key of a stored object, as returned by the shard.
///
/// Shards are content-addressed: the key is derived from the stored bytes,
/// so writing identical bytes twice yields the same key.
pub type ObjectKey = Vec<u8>;

/// Status of one object on one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    /// Object is present and passes the shard's integrity check
    Ok,
    /// Object is present but fails the shard's integrity check
    Corrupted,
    /// Object is absent
    Missing,
}

/// Health counters reported by a shard for its namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceHealth {
    pub index_io_errors: i64,
    pub index_faults: i64,
    pub data_io_errors: i64,
    pub data_faults: i64,
    /// Unix timestamp of the last index IO error, 0 if none
    pub index_io_error_last: i64,
    /// Unix timestamp of the last data IO error, 0 if none
    pub data_io_error_last: i64,
}

/// Information about a shard namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub label: String,
    pub nr_objects: u64,
    /// Bytes stored in the namespace
    pub used: u64,
    /// Bytes still available to the namespace
    pub free: u64,
    pub health: NamespaceHealth,
}

/// One transport session to one storage node within one namespace.
///
/// All operations are namespace-scoped. Implementations are shared across
/// pipeline workers and must be internally synchronized.
#[async_trait]
pub trait ShardClient: Send + Sync {
    /// Stable identifier of this shard within its cluster (its address)
    fn identifier(&self) -> &str;

    /// Store an object; the shard derives and returns the content key.
    ///
    /// Fails with [`StratusError::NamespaceFull`] when the namespace cannot
    /// accept more bytes.
    async fn put_object(&self, data: Bytes) -> Result<ObjectKey>;

    /// Fetch an object by key.
    ///
    /// Fails with [`StratusError::KeyNotFound`] when absent and
    /// [`StratusError::Corrupted`] when the shard detects corruption.
    async fn get_object(&self, key: &[u8]) -> Result<Bytes>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete_object(&self, key: &[u8]) -> Result<()>;

    /// Integrity status of an object
    async fn object_status(&self, key: &[u8]) -> Result<ObjectStatus>;

    /// Whether an object exists.
    ///
    /// A corrupted object surfaces as [`StratusError::Corrupted`] rather
    /// than as either boolean.
    async fn exist_object(&self, key: &[u8]) -> Result<bool> {
        match self.object_status(key).await? {
            ObjectStatus::Ok => Ok(true),
            ObjectStatus::Missing => Ok(false),
            ObjectStatus::Corrupted => Err(StratusError::Corrupted),
        }
    }

    /// Visit the keys of all objects stored in the namespace.
    ///
    /// Optional: transports without a listing verb return
    /// [`StratusError::NotSupported`].
    async fn list_object_keys(&self, _visit: &mut (dyn FnMut(ObjectKey) + Send)) -> Result<()> {
        Err(StratusError::NotSupported)
    }

    /// Information about the namespace this session is bound to
    async fn namespace_info(&self) -> Result<NamespaceInfo>;

    /// Bytes stored in the namespace, as cached since the session opened
    /// and bumped locally on every successful put. Only used by placement
    /// heuristics; may lag the shard's authoritative count.
    fn utilization(&self) -> u64;

    /// Release any open resources
    async fn close(&self) -> Result<()>;
}

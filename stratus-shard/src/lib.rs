//! Stratus shard layer
//!
//! Abstraction over the storage nodes ("shards") that hold content-addressed
//! objects:
//! - [`client::ShardClient`]: the verb set of one shard session
//! - [`zdb::ZdbShard`]: remote client for 0-db nodes (Redis-style protocol)
//! - [`memory::MemoryShard`]: in-memory shard for tests and embedded use
//! - [`cluster::ShardCluster`]: the configured shard set, with identifier
//!   lookup and policy-driven placement iteration

pub mod client;
pub mod cluster;
pub mod memory;
pub mod zdb;

pub use client::{NamespaceHealth, NamespaceInfo, ObjectKey, ObjectStatus, ShardClient};
pub use cluster::{DynShard, ShardCluster, ShardIterator, SpreadingPolicy};
pub use memory::MemoryShard;
pub use zdb::{ZdbConfig, ZdbShard};

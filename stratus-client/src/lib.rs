//! Stratus client
//!
//! The client-side data pipeline of the Stratus dispersed object store. A
//! stream written under a key is split into blocks; each block is hashed,
//! optionally compressed and encrypted, and dispersed across the shard
//! cluster by the configured storage mode (single / replication / erasure
//! coding). The resulting metadata record drives reads, integrity checks,
//! repairs and deletion.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratus_client::{Client, Config};
//! use stratus_metadata::SledMetaDb;
//!
//! # async fn example() -> stratus_core::Result<()> {
//! let config = Config::from_file("stratus.toml")?;
//! let meta_db = Arc::new(SledMetaDb::open("./meta")?);
//! let client = Client::from_config(config, meta_db).await?;
//!
//! let metadata = client.write(b"backup-2024", &b"hello stratus"[..]).await?;
//! let mut restored = Vec::new();
//! client.read(&metadata, &mut restored).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod pipeline;
pub mod storage;

pub use client::Client;
pub use config::{
    CompressionConfig, Config, DistributionConfig, EncryptionConfig, EncryptionType, HashConfig,
    MetaDatabaseConfig, MetaStoreConfig, PipelineConfig, ShardConfig, StorageMode,
};
pub use pipeline::{
    default_hasher_constructor, default_processor_constructor, HasherConstructor, Pipeline,
    ProcessorConstructor,
};
pub use storage::{
    CheckStatus, ChunkConfig, ChunkStorage, ErasureStorage, ReplicationStorage, SingleStorage,
};

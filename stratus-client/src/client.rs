//! Orchestrator client
//!
//! The top-level operations of Stratus: write a stream under a key, read it
//! back (fully or by range), check and repair its placements, and delete it.
//! Combines the data pipeline with the metadata client.

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::storage::{CheckStatus, ChunkConfig, ChunkStorage};
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{Result, StratusError};
use stratus_metadata::{MetaClient, MetaDb, Metadata};
use stratus_shard::ShardCluster;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

fn epoch_ns() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000))
}

/// Stratus client
pub struct Client {
    pipeline: Pipeline,
    metastor: MetaClient,
    cluster: Option<Arc<ShardCluster>>,
    cancel: CancellationToken,
}

impl Client {
    /// Create a client from an assembled pipeline and metadata client
    pub fn new(pipeline: Pipeline, metastor: MetaClient) -> Self {
        Self {
            pipeline,
            metastor,
            cluster: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a client from configuration: connects every listed 0-db
    /// shard, builds the pipeline and binds the metadata store.
    pub async fn from_config(config: Config, meta_db: Arc<dyn MetaDb>) -> Result<Self> {
        config.validate()?;
        let cluster = config.connect_cluster().await?;
        let pipeline = config.build_pipeline(cluster.clone())?;
        let metastor = MetaClient::new(meta_db, config.namespace.clone())?;
        Ok(Self {
            pipeline,
            metastor,
            cluster: Some(cluster),
            cancel: CancellationToken::new(),
        })
    }

    /// Token cancelling every in-flight and future operation of this client
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The metadata client in use
    pub fn meta_client(&self) -> &MetaClient {
        &self.metastor
    }

    /// The data pipeline in use
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Store the reader's stream under `key`, replacing any prior record
    pub async fn write<R>(&self, key: &[u8], reader: R) -> Result<Metadata>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.write_with(key, reader, BTreeMap::new(), None).await
    }

    /// Store the reader's stream under `key` with caller-defined metadata
    pub async fn write_with_user_meta<R>(
        &self,
        key: &[u8],
        reader: R,
        user_defined: BTreeMap<String, String>,
    ) -> Result<Metadata>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.write_with(key, reader, user_defined, None).await
    }

    /// Store the reader's stream under `key`, linked after the record at
    /// `previous_key` (whose `next_key` is updated in place)
    pub async fn write_with_linked_previous<R>(
        &self,
        key: &[u8],
        previous_key: &[u8],
        reader: R,
    ) -> Result<Metadata>
    where
        R: AsyncRead + Unpin + Send,
    {
        if previous_key.is_empty() {
            return Err(StratusError::InvalidInput(
                "previous key is empty".to_string(),
            ));
        }
        // fail before moving any data if the predecessor is missing
        self.metastor.get_metadata(previous_key).await?;

        let metadata = self
            .write_with(key, reader, BTreeMap::new(), Some(previous_key.to_vec()))
            .await?;

        let next = key.to_vec();
        self.metastor
            .update_metadata(previous_key, move |mut previous| {
                previous.next_key = Some(next.clone());
                Ok(previous)
            })
            .await?;

        Ok(metadata)
    }

    #[instrument(skip_all, fields(key = %hex::encode(key)))]
    async fn write_with<R>(
        &self,
        key: &[u8],
        reader: R,
        user_defined: BTreeMap<String, String>,
        previous_key: Option<Vec<u8>>,
    ) -> Result<Metadata>
    where
        R: AsyncRead + Unpin + Send,
    {
        if key.is_empty() {
            return Err(StratusError::InvalidInput("key is empty".to_string()));
        }

        let token = self.cancel.child_token();
        let chunks = self.pipeline.write(reader, &token).await?;
        let size: u64 = chunks.iter().map(|c| c.size).sum();

        let now = epoch_ns();
        // overwrites keep the original creation time and stay monotonic in
        // last_write_epoch even under clock skew
        let (created_epoch, floor) = match self.metastor.get_metadata(key).await {
            Ok(previous) => (previous.created_epoch, previous.last_write_epoch),
            Err(StratusError::KeyNotFound) => (now, 0),
            Err(err) => return Err(err),
        };

        let metadata = Metadata {
            key: key.to_vec(),
            size,
            created_epoch,
            last_write_epoch: now.max(floor + 1),
            chunks,
            previous_key,
            next_key: None,
            user_defined,
        };
        self.metastor.set_metadata(&metadata).await?;

        info!(size, chunks = metadata.chunks.len(), "stream stored");
        Ok(metadata)
    }

    /// Reconstruct the stream described by `metadata` into the writer
    pub async fn read<W>(&self, metadata: &Metadata, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let token = self.cancel.child_token();
        self.pipeline.read(&metadata.chunks, writer, &token).await
    }

    /// Reconstruct `length` bytes starting at `offset` into the writer
    pub async fn read_range<W>(
        &self,
        metadata: &Metadata,
        writer: &mut W,
        offset: u64,
        length: u64,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let token = self.cancel.child_token();
        self.pipeline
            .read_range(&metadata.chunks, writer, offset, length, &token)
            .await
    }

    /// Delete every object of every chunk, then the metadata record.
    /// Objects already gone are ignored.
    #[instrument(skip_all, fields(key = %hex::encode(&metadata.key)))]
    pub async fn delete(&self, metadata: &Metadata) -> Result<()> {
        let storage = self.pipeline.storage();
        for chunk in &metadata.chunks {
            storage
                .delete_chunk(&ChunkConfig {
                    objects: chunk.objects.clone(),
                })
                .await?;
        }
        self.metastor.delete_metadata(&metadata.key).await?;
        info!("stream deleted");
        Ok(())
    }

    /// Worst placement status across all chunks
    pub async fn check(&self, metadata: &Metadata, fast: bool) -> Result<CheckStatus> {
        let storage = self.pipeline.storage();
        let mut worst = CheckStatus::Optimal;
        for chunk in &metadata.chunks {
            let status = storage
                .check_chunk(
                    &ChunkConfig {
                        objects: chunk.objects.clone(),
                    },
                    fast,
                )
                .await?;
            worst = worst.min(status);
            if worst == CheckStatus::Invalid {
                break;
            }
        }
        Ok(worst)
    }

    /// Repair every chunk, persist the updated record and return it.
    ///
    /// Fails with [`StratusError::NotSupported`] when the storage mode has
    /// no redundancy to repair from.
    #[instrument(skip_all, fields(key = %hex::encode(&metadata.key)))]
    pub async fn repair(&self, metadata: &Metadata) -> Result<Metadata> {
        let storage = self.pipeline.storage();

        let mut repaired = metadata.clone();
        for chunk in &mut repaired.chunks {
            let config = storage
                .repair_chunk(&ChunkConfig {
                    objects: chunk.objects.clone(),
                })
                .await?;
            chunk.objects = config.objects;
        }

        repaired.last_write_epoch = epoch_ns().max(metadata.last_write_epoch + 1);
        self.metastor.set_metadata(&repaired).await?;

        info!(chunks = repaired.chunks.len(), "stream repaired");
        Ok(repaired)
    }

    /// Close the metadata store and, if this client owns one, the cluster
    pub async fn close(&self) -> Result<()> {
        self.metastor.close().await?;
        if let Some(cluster) = &self.cluster {
            cluster.close().await?;
        }
        Ok(())
    }
}

//! Parallel block pipeline
//!
//! Splits the caller's stream into blocks and drives hash → process → store
//! for each block on a bounded worker pool. Chunks are always assembled in
//! input order, independent of completion order. The reverse path fetches,
//! unprocesses and verifies each chunk, delivering bytes to the writer
//! strictly in order (chunks may be prefetched concurrently).
//!
//! Hashers and processors are not shared between workers: every block gets
//! fresh instances from the configured constructors.

use crate::storage::{ChunkConfig, ChunkStorage};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use stratus_core::{BlockHasher, Processor, ProcessorChain, Result, StratusError};
use stratus_metadata::Chunk;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Builds one hasher per worker
pub type HasherConstructor = Arc<dyn Fn() -> Result<BlockHasher> + Send + Sync>;

/// Builds one processor chain per worker
pub type ProcessorConstructor = Arc<dyn Fn() -> Result<ProcessorChain> + Send + Sync>;

/// A hasher constructor producing unkeyed BLAKE2b-256 hashers
pub fn default_hasher_constructor() -> HasherConstructor {
    Arc::new(|| Ok(BlockHasher::new()))
}

/// A processor constructor producing identity chains
pub fn default_processor_constructor() -> ProcessorConstructor {
    Arc::new(|| Ok(ProcessorChain::new(Vec::new())))
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(64)
}

/// The streaming chunk pipeline
pub struct Pipeline {
    /// Block size in bytes; 0 disables splitting (one block per stream)
    block_size: usize,
    workers: usize,
    hasher_ctor: HasherConstructor,
    processor_ctor: ProcessorConstructor,
    storage: Arc<dyn ChunkStorage>,
}

impl Pipeline {
    /// Create a pipeline over a chunk storage.
    ///
    /// Worker parallelism defaults to the number of hardware threads
    /// (bounded); override with [`Pipeline::with_workers`].
    pub fn new(
        block_size: usize,
        storage: Arc<dyn ChunkStorage>,
        hasher_ctor: HasherConstructor,
        processor_ctor: ProcessorConstructor,
    ) -> Self {
        Self {
            block_size,
            workers: default_workers(),
            hasher_ctor,
            processor_ctor,
            storage,
        }
    }

    /// Override the worker parallelism (clamped to at least 1)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// The chunk storage driven by this pipeline
    pub fn storage(&self) -> Arc<dyn ChunkStorage> {
        self.storage.clone()
    }

    /// Consume the reader into stored chunks, returned in input order.
    ///
    /// On the first failing block the pipeline cancels remaining work,
    /// drains in-flight workers and returns that error; objects already
    /// placed stay on their shards (orphaned).
    pub async fn write<R>(&self, reader: R, cancel: &CancellationToken) -> Result<Vec<Chunk>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let cancel = cancel.child_token();
        let block_size = self.block_size;

        let splitter = stream::try_unfold(
            (reader, 0u64, false),
            move |(mut reader, index, done)| async move {
                if done {
                    return Ok::<_, StratusError>(None);
                }
                if block_size == 0 {
                    // splitting disabled: the whole stream is one block
                    let mut buf = Vec::new();
                    reader.read_to_end(&mut buf).await?;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(((index, Bytes::from(buf)), (reader, index + 1, true))));
                }

                let mut buf = vec![0u8; block_size];
                let mut filled = 0usize;
                while filled < block_size {
                    let n = reader.read(&mut buf[filled..]).await?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
                if filled == 0 {
                    return Ok(None);
                }
                buf.truncate(filled);
                Ok(Some(((index, Bytes::from(buf)), (reader, index + 1, false))))
            },
        );

        let results = splitter
            .map(|next| {
                let storage = self.storage.clone();
                let hasher_ctor = self.hasher_ctor.clone();
                let processor_ctor = self.processor_ctor.clone();
                let cancel = cancel.clone();
                async move {
                    let (index, block) = next?;
                    if cancel.is_cancelled() {
                        return Err(StratusError::Cancelled);
                    }
                    tokio::spawn(process_block(
                        index,
                        block,
                        storage,
                        hasher_ctor,
                        processor_ctor,
                        cancel,
                    ))
                    .await
                    .map_err(|err| {
                        StratusError::Internal(format!("pipeline worker failed: {}", err))
                    })?
                }
            })
            .buffered(self.workers);
        futures::pin_mut!(results);

        let mut chunks = Vec::new();
        while let Some(result) = results.next().await {
            match result {
                Ok(chunk) => chunks.push(chunk),
                Err(err) => {
                    // abandon remaining blocks; in-flight workers observe the
                    // token at their next suspension point
                    cancel.cancel();
                    return Err(err);
                }
            }
        }
        debug!(chunks = chunks.len(), "pipeline write finished");
        Ok(chunks)
    }

    /// Reconstruct the full stream described by `chunks` into the writer
    pub async fn read<W>(
        &self,
        chunks: &[Chunk],
        writer: &mut W,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let parts = chunks
            .iter()
            .map(|chunk| (chunk.clone(), 0usize, chunk.size as usize))
            .collect();
        self.read_parts(parts, writer, cancel).await
    }

    /// Reconstruct `length` bytes starting at `offset` into the writer.
    ///
    /// Only the chunks overlapping the range are fetched; a zero-length
    /// range yields nothing.
    pub async fn read_range<W>(
        &self,
        chunks: &[Chunk],
        writer: &mut W,
        offset: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if length == 0 {
            return Ok(());
        }

        let total: u64 = chunks.iter().map(|c| c.size).sum();
        let end = offset
            .checked_add(length)
            .ok_or_else(|| StratusError::InvalidInput("range overflows".to_string()))?;
        if end > total {
            return Err(StratusError::InvalidInput(format!(
                "range {}..{} exceeds stream size {}",
                offset, end, total
            )));
        }

        // prefix sums locate the first chunk with chunk_end > offset
        let mut parts = Vec::new();
        let mut chunk_start = 0u64;
        for chunk in chunks {
            let chunk_end = chunk_start + chunk.size;
            if chunk_end > offset {
                let begin = offset.saturating_sub(chunk_start) as usize;
                let stop = (end.min(chunk_end) - chunk_start) as usize;
                parts.push((chunk.clone(), begin, stop));
            }
            if chunk_end >= end {
                break;
            }
            chunk_start = chunk_end;
        }

        self.read_parts(parts, writer, cancel).await
    }

    /// Fetch the given chunk slices concurrently and write them in order
    async fn read_parts<W>(
        &self,
        parts: Vec<(Chunk, usize, usize)>,
        writer: &mut W,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let cancel = cancel.child_token();

        let blocks = stream::iter(parts.into_iter().enumerate())
            .map(|(index, (chunk, begin, stop))| {
                let storage = self.storage.clone();
                let hasher_ctor = self.hasher_ctor.clone();
                let processor_ctor = self.processor_ctor.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return Err(StratusError::Cancelled);
                    }
                    let block = tokio::spawn(fetch_block(
                        index as u64,
                        chunk,
                        storage,
                        hasher_ctor,
                        processor_ctor,
                        cancel,
                    ))
                    .await
                    .map_err(|err| {
                        StratusError::Internal(format!("pipeline worker failed: {}", err))
                    })??;
                    Ok((block, begin, stop))
                }
            })
            .buffered(self.workers);
        futures::pin_mut!(blocks);

        while let Some(result) = blocks.next().await {
            match result {
                Ok((block, begin, stop)) => {
                    writer.write_all(&block[begin..stop]).await?;
                }
                Err(err) => {
                    cancel.cancel();
                    return Err(err);
                }
            }
        }
        writer.flush().await?;
        Ok(())
    }
}

/// One write-side worker step: hash, process, disperse
async fn process_block(
    index: u64,
    block: Bytes,
    storage: Arc<dyn ChunkStorage>,
    hasher_ctor: HasherConstructor,
    processor_ctor: ProcessorConstructor,
    cancel: CancellationToken,
) -> Result<Chunk> {
    let hasher = hasher_ctor()?;
    let mut processor = processor_ctor()?;

    let hash = hasher.hash_bytes(&block);
    let processed = processor.write_block(&block)?;

    let config = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(StratusError::Cancelled),
        result = storage.write_chunk(Bytes::from(processed)) => result?,
    };

    Ok(Chunk {
        size: block.len() as u64,
        hash,
        objects: config.objects,
    })
}

/// One read-side worker step: gather, unprocess, verify
async fn fetch_block(
    index: u64,
    chunk: Chunk,
    storage: Arc<dyn ChunkStorage>,
    hasher_ctor: HasherConstructor,
    processor_ctor: ProcessorConstructor,
    cancel: CancellationToken,
) -> Result<Bytes> {
    let hasher = hasher_ctor()?;
    let mut processor = processor_ctor()?;

    let config = ChunkConfig {
        objects: chunk.objects.clone(),
    };
    let processed = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(StratusError::Cancelled),
        result = storage.read_chunk(&config) => result?,
    };

    let block = processor.read_block(&processed)?;
    if block.len() as u64 != chunk.size || !hasher.verify(&block, &chunk.hash) {
        return Err(StratusError::HashMismatch { index });
    }
    Ok(Bytes::from(block))
}

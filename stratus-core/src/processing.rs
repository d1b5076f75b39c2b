//! Block processing: compression and encryption stages
//!
//! A [`Processor`] transforms a block on its way to storage (`write_block`)
//! and undoes that transform on the way back (`read_block`), such that
//! `read_block(write_block(x)) == x`. Stages compose through
//! [`ProcessorChain`]: compression first, then encryption on write, reversed
//! on read.
//!
//! Processors are not required to be reentrant; the pipeline constructs one
//! instance per worker.

use crate::crypto::{self, EncryptionKey};
use crate::error::{Result, StratusError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// An invertible block transformation
pub trait Processor: Send {
    /// Forward transform, applied while writing to storage
    fn write_block(&mut self, data: &[u8]) -> Result<Vec<u8>>;

    /// Inverse transform, applied while reading from storage
    fn read_block(&mut self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Identity processor
#[derive(Debug, Default)]
pub struct NopProcessor;

impl Processor for NopProcessor {
    fn write_block(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn read_block(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionAlgorithm {
    #[default]
    Snappy,
    Lz4,
    Gzip,
}

/// Compression effort modes.
///
/// Only gzip distinguishes the levels; snappy and lz4 have a single
/// operating point and treat every enabled mode the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionMode {
    #[default]
    Default,
    BestSpeed,
    BestCompression,
    /// Identity: the stage is skipped entirely
    Disabled,
}

/// Compression stage
pub struct Compressor {
    algorithm: CompressionAlgorithm,
    mode: CompressionMode,
    // snap codecs keep an internal scratch buffer, hence per-instance state
    snap_encoder: snap::raw::Encoder,
    snap_decoder: snap::raw::Decoder,
}

impl Compressor {
    /// Create a compression stage for the given algorithm and mode.
    ///
    /// [`CompressionMode::Disabled`] is handled by
    /// [`ProcessorChain::builder`]; a `Compressor` itself always compresses.
    pub fn new(algorithm: CompressionAlgorithm, mode: CompressionMode) -> Self {
        Self {
            algorithm,
            mode,
            snap_encoder: snap::raw::Encoder::new(),
            snap_decoder: snap::raw::Decoder::new(),
        }
    }

    fn gzip_level(&self) -> flate2::Compression {
        match self.mode {
            CompressionMode::BestSpeed => flate2::Compression::fast(),
            CompressionMode::BestCompression => flate2::Compression::best(),
            _ => flate2::Compression::default(),
        }
    }
}

impl Processor for Compressor {
    fn write_block(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            CompressionAlgorithm::Snappy => self
                .snap_encoder
                .compress_vec(data)
                .map_err(|e| StratusError::Compression(e.to_string())),
            CompressionAlgorithm::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            CompressionAlgorithm::Gzip => {
                let mut encoder = flate2::write::GzEncoder::new(
                    Vec::with_capacity(data.len() / 2),
                    self.gzip_level(),
                );
                encoder
                    .write_all(data)
                    .and_then(|_| encoder.finish())
                    .map_err(|e| StratusError::Compression(e.to_string()))
            }
        }
    }

    fn read_block(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            CompressionAlgorithm::Snappy => self
                .snap_decoder
                .decompress_vec(data)
                .map_err(|e| StratusError::Decompression(e.to_string())),
            CompressionAlgorithm::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| StratusError::Decompression(e.to_string())),
            CompressionAlgorithm::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(data);
                let mut out = Vec::with_capacity(data.len() * 2);
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| StratusError::Decompression(e.to_string()))?;
                Ok(out)
            }
        }
    }
}

/// Encryption stage (AES-GCM, see [`crate::crypto`])
pub struct Encrypter {
    key: EncryptionKey,
}

impl Encrypter {
    /// Create an encryption stage from a 16/24/32-byte key
    pub fn new(key: &[u8]) -> Result<Self> {
        Ok(Self {
            key: EncryptionKey::from_slice(key)?,
        })
    }
}

impl Processor for Encrypter {
    fn write_block(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        crypto::encrypt_to_bytes(data, &self.key)
    }

    fn read_block(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        crypto::decrypt_from_bytes(data, &self.key)
    }
}

/// A sequence of stages applied in order on write and reversed on read
pub struct ProcessorChain {
    stages: Vec<Box<dyn Processor>>,
}

impl ProcessorChain {
    /// Create a chain from explicit stages
    pub fn new(stages: Vec<Box<dyn Processor>>) -> Self {
        Self { stages }
    }

    /// Build the standard compress-then-encrypt chain.
    ///
    /// `compression` with mode [`CompressionMode::Disabled`] skips the
    /// compression stage; `encryption_key = None` skips encryption. An empty
    /// chain behaves as the identity.
    pub fn builder(
        compression: Option<(CompressionAlgorithm, CompressionMode)>,
        encryption_key: Option<&[u8]>,
    ) -> Result<Self> {
        let mut stages: Vec<Box<dyn Processor>> = Vec::with_capacity(2);

        if let Some((algorithm, mode)) = compression {
            if mode != CompressionMode::Disabled {
                stages.push(Box::new(Compressor::new(algorithm, mode)));
            }
        }
        if let Some(key) = encryption_key {
            stages.push(Box::new(Encrypter::new(key)?));
        }

        Ok(Self { stages })
    }

    /// Number of active stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain is the identity
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Processor for ProcessorChain {
    fn write_block(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut current = data.to_vec();
        for stage in self.stages.iter_mut() {
            current = stage.write_block(&current)?;
        }
        Ok(current)
    }

    fn read_block(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut current = data.to_vec();
        for stage in self.stages.iter_mut().rev() {
            current = stage.read_block(&current)?;
        }
        Ok(current)
    }
}

//! Metadata record model
//!
//! A [`Metadata`] record describes one stored stream: its chunks in input
//! order, where each chunk's objects live, and bookkeeping timestamps. The
//! record is everything needed to read, check, repair or delete the stream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stratus_core::{ContentHash, Result, StratusError};

/// Placement of one object: which shard holds it, under which key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLocation {
    /// Identifier of the shard within the cluster
    pub shard_id: String,
    /// Content key of the object on that shard
    pub key: Vec<u8>,
}

/// Metadata of one block of the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Original block length in bytes, before processing
    pub size: u64,
    /// Fingerprint of the original block bytes
    pub hash: ContentHash,
    /// Object placements in placement order; reads try them in this order
    pub objects: Vec<ObjectLocation>,
}

/// Metadata record of one stored stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Caller-supplied key the record is stored under
    pub key: Vec<u8>,
    /// Total stream length in bytes (sum of chunk sizes)
    pub size: u64,
    /// Creation time, nanoseconds since the Unix epoch
    pub created_epoch: i64,
    /// Time of the last successful write or repair, nanoseconds since the
    /// Unix epoch; strictly increases across writes to the same key
    pub last_write_epoch: i64,
    /// Chunks in input order
    pub chunks: Vec<Chunk>,
    /// Optional link to the previous record of a caller-managed list
    pub previous_key: Option<Vec<u8>>,
    /// Optional link to the next record of a caller-managed list
    pub next_key: Option<Vec<u8>>,
    /// Caller-defined metadata
    pub user_defined: BTreeMap<String, String>,
}

impl Metadata {
    /// Create a record with the given key and timestamps, no chunks yet
    pub fn new(key: Vec<u8>, created_epoch: i64, last_write_epoch: i64) -> Self {
        Self {
            key,
            size: 0,
            created_epoch,
            last_write_epoch,
            chunks: Vec::new(),
            previous_key: None,
            next_key: None,
            user_defined: BTreeMap::new(),
        }
    }

    /// Validate the record's structural invariants:
    /// - non-empty key
    /// - `size` equals the sum of chunk sizes
    /// - no zero-sized chunk
    /// - uniform object cardinality across chunks
    /// - distinct shards within each chunk
    /// - positive, non-decreasing timestamps
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(StratusError::InvalidInput(
                "metadata key is empty".to_string(),
            ));
        }
        if self.last_write_epoch <= 0 {
            return Err(StratusError::InvalidInput(
                "last_write_epoch must be positive".to_string(),
            ));
        }
        if self.last_write_epoch < self.created_epoch {
            return Err(StratusError::InvalidInput(
                "last_write_epoch precedes created_epoch".to_string(),
            ));
        }

        let mut total = 0u64;
        let cardinality = self.chunks.first().map(|c| c.objects.len());
        for (index, chunk) in self.chunks.iter().enumerate() {
            if chunk.size == 0 {
                return Err(StratusError::InvalidInput(format!(
                    "chunk {} has size 0",
                    index
                )));
            }
            if Some(chunk.objects.len()) != cardinality {
                return Err(StratusError::InvalidInput(format!(
                    "chunk {} has {} objects, expected {}",
                    index,
                    chunk.objects.len(),
                    cardinality.unwrap_or(0)
                )));
            }
            let mut seen = std::collections::HashSet::with_capacity(chunk.objects.len());
            for object in &chunk.objects {
                if !seen.insert(object.shard_id.as_str()) {
                    return Err(StratusError::InvalidInput(format!(
                        "chunk {} places two objects on shard {}",
                        index, object.shard_id
                    )));
                }
            }
            total += chunk.size;
        }

        if total != self.size {
            return Err(StratusError::InvalidInput(format!(
                "size {} does not match chunk total {}",
                self.size, total
            )));
        }
        Ok(())
    }
}

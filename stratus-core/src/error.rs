//! Error types for Stratus
//!
//! Provides a unified error type for the whole client data path.

use thiserror::Error;

/// Result type alias for Stratus operations
pub type Result<T> = std::result::Result<T, StratusError>;

/// Unified error type for Stratus
#[derive(Error, Debug)]
pub enum StratusError {
    // ===== Object & Metadata Errors =====
    #[error("Key not found")]
    KeyNotFound,

    #[error("Object corrupted on shard")]
    Corrupted,

    #[error("Hash verification failed for block {index}")]
    HashMismatch { index: u64 },

    #[error("Namespace full: shard cannot accept more data")]
    NamespaceFull,

    // ===== Cluster Errors =====
    #[error("Shard not found: {0}")]
    ShardNotFound(String),

    #[error("Insufficient shards for write: placed {placed}, need {required}")]
    WriteInsufficient { placed: usize, required: usize },

    #[error("Insufficient shards for read: have {available}, need {required}")]
    ReadInsufficient { available: usize, required: usize },

    // ===== Erasure Coding Errors =====
    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    #[error("Insufficient shares: have {available}, need {required}")]
    InsufficientShares { available: usize, required: usize },

    #[error("All replicates corrupted, repair impossible")]
    AllReplicatesCorrupted,

    // ===== Cryptography Errors =====
    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Invalid key length: got {actual}, expected one of {expected}")]
    InvalidKeyLength {
        expected: &'static str,
        actual: usize,
    },

    // ===== Processing Errors =====
    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    // ===== Operation Errors =====
    #[error("Operation not supported for the configured storage mode")]
    NotSupported,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    Timeout,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // ===== I/O & Transport Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Metadata store error: {0}")]
    MetaStore(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reed_solomon_erasure::Error> for StratusError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        StratusError::ErasureCoding(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StratusError::ReadInsufficient {
            available: 1,
            required: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient shards for read: have 1, need 2"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StratusError = io_err.into();
        assert!(matches!(err, StratusError::Io(_)));
    }
}

//! Stratus core library
//!
//! Shared primitives for the Stratus dispersed object store client:
//! - 256-bit content hashing (keyed BLAKE2b-256 by default, BLAKE3-256 optional)
//! - AES-GCM authenticated encryption (128/192/256-bit keys)
//! - Invertible block processing (compression + encryption stages)
//! - Reed-Solomon erasure coding over GF(2^8)
//! - Unified error type for the whole data path

pub mod crypto;
pub mod erasure;
pub mod error;
pub mod hash;
pub mod processing;

pub use crypto::EncryptionKey;
pub use erasure::{ErasureCodec, ErasureConfig};
pub use error::{Result, StratusError};
pub use hash::{BlockHasher, ContentHash, HashAlgorithm, HASH_SIZE};
pub use processing::{
    CompressionAlgorithm, CompressionMode, Compressor, Encrypter, NopProcessor, Processor,
    ProcessorChain,
};

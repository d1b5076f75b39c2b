//! Content hashing for Stratus
//!
//! Every block and every stored object is fingerprinted with a 256-bit
//! content hash. The default algorithm is keyed BLAKE2b-256; BLAKE3-256 is
//! available as an alternative.

use crate::error::{Result, StratusError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a content hash in bytes
pub const HASH_SIZE: usize = 32;

/// 256-bit content fingerprint
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; HASH_SIZE]);

impl ContentHash {
    /// Create a ContentHash from raw bytes
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a ContentHash from a slice (validates length)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != HASH_SIZE {
            return Err(StratusError::InvalidInput(format!(
                "invalid hash length: expected {}, got {}",
                HASH_SIZE,
                slice.len()
            )));
        }
        let mut arr = [0u8; HASH_SIZE];
        arr.copy_from_slice(slice);
        Ok(Self(arr))
    }

    /// Get the raw hash bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| StratusError::InvalidInput(format!("invalid hash hex: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        if bytes.len() != HASH_SIZE {
            return Err(serde::de::Error::custom("invalid hash length"));
        }
        let mut arr = [0u8; HASH_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// Supported hash algorithms (all 256-bit output)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    /// BLAKE2b with 32-byte output, optionally keyed (key up to 64 bytes)
    #[default]
    #[serde(rename = "blake2b-256", alias = "blake2-256")]
    Blake2b256,
    /// BLAKE3, optionally keyed (key must be exactly 32 bytes)
    #[serde(rename = "blake3-256", alias = "blake3")]
    Blake3_256,
}

/// Maximum key length accepted by the keyed BLAKE2b hasher
pub const MAX_BLAKE2_KEY_SIZE: usize = 64;

/// A block fingerprinter.
///
/// Instances are cheap to construct and are not shared between pipeline
/// workers; each worker builds its own from a [`HasherConstructor`]
/// (see `stratus-client`).
#[derive(Clone)]
pub struct BlockHasher {
    algorithm: HashAlgorithm,
    key: Option<Vec<u8>>,
}

impl BlockHasher {
    /// Create an unkeyed hasher with the default algorithm (BLAKE2b-256)
    pub fn new() -> Self {
        Self {
            algorithm: HashAlgorithm::Blake2b256,
            key: None,
        }
    }

    /// Create a hasher with the given algorithm and optional key
    pub fn with_algorithm(algorithm: HashAlgorithm, key: Option<&[u8]>) -> Result<Self> {
        if let Some(key) = key {
            match algorithm {
                HashAlgorithm::Blake2b256 => {
                    if key.is_empty() || key.len() > MAX_BLAKE2_KEY_SIZE {
                        return Err(StratusError::InvalidKeyLength {
                            expected: "1..=64",
                            actual: key.len(),
                        });
                    }
                }
                HashAlgorithm::Blake3_256 => {
                    if key.len() != 32 {
                        return Err(StratusError::InvalidKeyLength {
                            expected: "32",
                            actual: key.len(),
                        });
                    }
                }
            }
        }
        Ok(Self {
            algorithm,
            key: key.map(|k| k.to_vec()),
        })
    }

    /// Compute the fingerprint of a block
    pub fn hash_bytes(&self, data: &[u8]) -> ContentHash {
        match (self.algorithm, &self.key) {
            (HashAlgorithm::Blake2b256, None) => {
                use blake2::digest::consts::U32;
                use blake2::{Blake2b, Digest};
                let mut hasher = Blake2b::<U32>::new();
                hasher.update(data);
                let digest = hasher.finalize();
                ContentHash(digest.into())
            }
            (HashAlgorithm::Blake2b256, Some(key)) => {
                use blake2::digest::consts::U32;
                use blake2::digest::Mac;
                use blake2::Blake2bMac;
                // length validated at construction
                let mut mac = Blake2bMac::<U32>::new_from_slice(key)
                    .expect("key length checked in constructor");
                mac.update(data);
                let digest = mac.finalize().into_bytes();
                ContentHash(digest.into())
            }
            (HashAlgorithm::Blake3_256, None) => ContentHash(*blake3::hash(data).as_bytes()),
            (HashAlgorithm::Blake3_256, Some(key)) => {
                let mut key_arr = [0u8; 32];
                key_arr.copy_from_slice(key);
                ContentHash(*blake3::keyed_hash(&key_arr, data).as_bytes())
            }
        }
    }

    /// Verify that data matches the given fingerprint
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.hash_bytes(data) == *expected
    }

    /// The algorithm this hasher uses
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

impl Default for BlockHasher {
    fn default() -> Self {
        Self::new()
    }
}

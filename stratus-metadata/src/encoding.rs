//! Binary encoding of metadata records
//!
//! Records are stored as one version byte followed by the bincode encoding
//! of [`Metadata`] (fixed-width little-endian integers, length-prefixed
//! sequences). The version byte gates cross-version reads: decoding a record
//! with an unknown version fails rather than misinterpreting bytes.

use crate::types::Metadata;
use stratus_core::{Result, StratusError};

/// Current encoding version
pub const METADATA_VERSION: u8 = 1;

/// Encode a metadata record, version tag first
pub fn encode_metadata(metadata: &Metadata) -> Result<Vec<u8>> {
    let body = bincode::serialize(metadata)
        .map_err(|e| StratusError::Serialization(e.to_string()))?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(METADATA_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a metadata record, checking the version tag
pub fn decode_metadata(data: &[u8]) -> Result<Metadata> {
    let (&version, body) = data.split_first().ok_or_else(|| {
        StratusError::Serialization("empty metadata record".to_string())
    })?;
    if version != METADATA_VERSION {
        return Err(StratusError::Serialization(format!(
            "unsupported metadata version {}",
            version
        )));
    }
    bincode::deserialize(body).map_err(|e| StratusError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ObjectLocation};
    use stratus_core::BlockHasher;

    fn sample() -> Metadata {
        let mut meta = Metadata::new(b"some-key".to_vec(), 1_000, 2_000);
        meta.size = 48;
        meta.chunks = vec![Chunk {
            size: 48,
            hash: BlockHasher::new().hash_bytes(b"block"),
            objects: vec![
                ObjectLocation {
                    shard_id: "127.0.0.1:9900".to_string(),
                    key: vec![0xAA; 32],
                },
                ObjectLocation {
                    shard_id: "127.0.0.1:9901".to_string(),
                    key: vec![0xBB; 32],
                },
            ],
        }];
        meta.previous_key = Some(b"prev".to_vec());
        meta.user_defined.insert("owner".to_string(), "tests".to_string());
        meta
    }

    #[test]
    fn test_roundtrip() {
        let meta = sample();
        let encoded = encode_metadata(&meta).unwrap();
        assert_eq!(encoded[0], METADATA_VERSION);
        assert_eq!(decode_metadata(&encoded).unwrap(), meta);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let meta = sample();
        assert_eq!(encode_metadata(&meta).unwrap(), encode_metadata(&meta).unwrap());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut encoded = encode_metadata(&sample()).unwrap();
        encoded[0] = 99;
        assert!(matches!(
            decode_metadata(&encoded),
            Err(StratusError::Serialization(_))
        ));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(decode_metadata(&[]).is_err());
    }

    #[test]
    fn test_truncated_body_rejected() {
        let encoded = encode_metadata(&sample()).unwrap();
        assert!(decode_metadata(&encoded[..encoded.len() / 2]).is_err());
    }
}

//! Reed-Solomon erasure coding
//!
//! Splits a processed block into `data_shards + parity_shards` shares using
//! a systematic code over GF(2^8); any `data_shards` of them suffice to
//! reconstruct the block.
//!
//! Shares are framed with an 8-byte little-endian length header ahead of the
//! zero padding, so decoding does not need the payload length from the
//! caller.

use crate::error::{Result, StratusError};
use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};

/// Size of the length header prepended to the payload before splitting
const LEN_HEADER_SIZE: usize = 8;

/// Erasure coding configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureConfig {
    /// Number of data shards (minimum required to reconstruct)
    pub data_shards: usize,
    /// Number of parity shards (tolerated losses)
    pub parity_shards: usize,
}

impl ErasureConfig {
    /// Create a new erasure config
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 {
            return Err(StratusError::Configuration(
                "data_shards must be > 0".to_string(),
            ));
        }
        if parity_shards == 0 {
            return Err(StratusError::Configuration(
                "parity_shards must be > 0".to_string(),
            ));
        }
        Ok(Self {
            data_shards,
            parity_shards,
        })
    }

    /// Total number of shares produced per block
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Maximum number of lost shares that can be tolerated
    pub fn max_failures(&self) -> usize {
        self.parity_shards
    }
}

/// Reed-Solomon encoder/decoder for one `(data, parity)` geometry
pub struct ErasureCodec {
    config: ErasureConfig,
    rs: ReedSolomon,
}

impl ErasureCodec {
    /// Create a codec for the given configuration
    pub fn new(config: ErasureConfig) -> Result<Self> {
        let rs = ReedSolomon::new(config.data_shards, config.parity_shards)?;
        Ok(Self { config, rs })
    }

    /// The codec's configuration
    pub fn config(&self) -> &ErasureConfig {
        &self.config
    }

    /// Encode a payload into `data + parity` equally-sized shares
    pub fn encode(&self, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        let payload_len = LEN_HEADER_SIZE + data.len();
        let shard_size = payload_len.div_ceil(self.config.data_shards);

        let mut payload = Vec::with_capacity(shard_size * self.config.data_shards);
        payload.extend_from_slice(&(data.len() as u64).to_le_bytes());
        payload.extend_from_slice(data);
        payload.resize(shard_size * self.config.data_shards, 0);

        let mut shards: Vec<Vec<u8>> = payload.chunks(shard_size).map(|c| c.to_vec()).collect();
        for _ in 0..self.config.parity_shards {
            shards.push(vec![0u8; shard_size]);
        }

        self.rs.encode(&mut shards)?;
        Ok(shards)
    }

    /// Decode shares back into the original payload.
    ///
    /// `shares` must have `total_shards()` entries in share order, with
    /// missing shares represented as `None`. At least `data_shards` entries
    /// must be present.
    pub fn decode(&self, shares: &mut [Option<Vec<u8>>]) -> Result<Vec<u8>> {
        self.reconstruct(shares)?;

        let mut payload =
            Vec::with_capacity(shares[0].as_ref().map(|s| s.len()).unwrap_or(0) * self.config.data_shards);
        for share in shares.iter().take(self.config.data_shards) {
            match share {
                Some(data) => payload.extend_from_slice(data),
                None => {
                    return Err(StratusError::ErasureCoding(
                        "reconstruction left a data share missing".to_string(),
                    ))
                }
            }
        }

        if payload.len() < LEN_HEADER_SIZE {
            return Err(StratusError::ErasureCoding(
                "payload shorter than length header".to_string(),
            ));
        }
        let mut len_bytes = [0u8; LEN_HEADER_SIZE];
        len_bytes.copy_from_slice(&payload[..LEN_HEADER_SIZE]);
        let data_len = u64::from_le_bytes(len_bytes) as usize;

        if data_len > payload.len() - LEN_HEADER_SIZE {
            return Err(StratusError::ErasureCoding(format!(
                "corrupt length header: {} exceeds payload of {}",
                data_len,
                payload.len() - LEN_HEADER_SIZE
            )));
        }

        payload.drain(..LEN_HEADER_SIZE);
        payload.truncate(data_len);
        Ok(payload)
    }

    /// Reconstruct all missing shares in place.
    ///
    /// Used by repair to regenerate lost shares without extracting the
    /// payload.
    pub fn reconstruct(&self, shares: &mut [Option<Vec<u8>>]) -> Result<()> {
        let total = self.config.total_shards();
        if shares.len() != total {
            return Err(StratusError::ErasureCoding(format!(
                "expected {} shares, got {}",
                total,
                shares.len()
            )));
        }

        let available = shares.iter().filter(|s| s.is_some()).count();
        if available < self.config.data_shards {
            return Err(StratusError::InsufficientShares {
                available,
                required: self.config.data_shards,
            });
        }

        self.rs.reconstruct(shares)?;
        Ok(())
    }

    /// Verify that a full set of shares is consistent with the code
    pub fn verify(&self, shares: &[Vec<u8>]) -> Result<bool> {
        if shares.len() != self.config.total_shards() {
            return Ok(false);
        }
        let refs: Vec<&[u8]> = shares.iter().map(|s| s.as_slice()).collect();
        Ok(self.rs.verify(&refs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(d: usize, p: usize) -> ErasureCodec {
        ErasureCodec::new(ErasureConfig::new(d, p).unwrap()).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(ErasureConfig::new(0, 1).is_err());
        assert!(ErasureConfig::new(1, 0).is_err());

        let config = ErasureConfig::new(2, 1).unwrap();
        assert_eq!(config.total_shards(), 3);
        assert_eq!(config.max_failures(), 1);
    }

    #[test]
    fn test_encode_decode_all_shares() {
        let codec = codec(2, 1);
        let original = b"Stratus erasure coding roundtrip".to_vec();

        let shares = codec.encode(&original).unwrap();
        assert_eq!(shares.len(), 3);

        let mut opts: Vec<Option<Vec<u8>>> = shares.into_iter().map(Some).collect();
        assert_eq!(codec.decode(&mut opts).unwrap(), original);
    }

    #[test]
    fn test_decode_with_any_data_shards() {
        let codec = codec(4, 2);
        let original: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let shares = codec.encode(&original).unwrap();

        // drop every pair of shares in turn
        for a in 0..6 {
            for b in (a + 1)..6 {
                let mut opts: Vec<Option<Vec<u8>>> =
                    shares.iter().cloned().map(Some).collect();
                opts[a] = None;
                opts[b] = None;
                assert_eq!(codec.decode(&mut opts).unwrap(), original);
            }
        }
    }

    #[test]
    fn test_too_many_missing() {
        let codec = codec(2, 1);
        let shares = codec.encode(b"too many losses").unwrap();

        let mut opts: Vec<Option<Vec<u8>>> = shares.into_iter().map(Some).collect();
        opts[0] = None;
        opts[2] = None;

        assert!(matches!(
            codec.decode(&mut opts),
            Err(StratusError::InsufficientShares {
                available: 1,
                required: 2
            })
        ));
    }

    #[test]
    fn test_reconstruct_restores_missing_share() {
        let codec = codec(3, 2);
        let shares = codec.encode(b"reconstruct one share").unwrap();

        let mut opts: Vec<Option<Vec<u8>>> = shares.iter().cloned().map(Some).collect();
        opts[1] = None;
        opts[4] = None;
        codec.reconstruct(&mut opts).unwrap();

        for (restored, original) in opts.iter().zip(shares.iter()) {
            assert_eq!(restored.as_ref().unwrap(), original);
        }
    }

    #[test]
    fn test_empty_payload() {
        let codec = codec(2, 1);
        let shares = codec.encode(b"").unwrap();
        let mut opts: Vec<Option<Vec<u8>>> = shares.into_iter().map(Some).collect();
        assert!(codec.decode(&mut opts).unwrap().is_empty());
    }

    #[test]
    fn test_verify_detects_corruption() {
        let codec = codec(2, 2);
        let mut shares = codec.encode(b"verify me").unwrap();
        assert!(codec.verify(&shares).unwrap());

        shares[0][0] ^= 0xFF;
        assert!(!codec.verify(&shares).unwrap());
    }

    #[test]
    fn test_share_count_mismatch() {
        let codec = codec(2, 1);
        let mut opts: Vec<Option<Vec<u8>>> = vec![Some(vec![0u8; 4]); 2];
        assert!(matches!(
            codec.decode(&mut opts),
            Err(StratusError::ErasureCoding(_))
        ));
    }
}

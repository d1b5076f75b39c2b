//! AES-GCM encryption for Stratus
//!
//! Processed blocks are sealed with AES-GCM (128/192/256-bit keys) using a
//! random 96-bit nonce per call. Wire layout: `nonce || ciphertext || tag`.

use crate::error::{Result, StratusError};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AesGcm, Nonce};
use std::fmt;

/// AES-GCM nonce size (12 bytes / 96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

type Aes128Gcm = AesGcm<Aes128, U12>;
type Aes192Gcm = AesGcm<Aes192, U12>;
type Aes256Gcm = AesGcm<Aes256, U12>;

/// An AES key of 16, 24 or 32 bytes
#[derive(Clone)]
pub struct EncryptionKey(Vec<u8>);

impl EncryptionKey {
    /// Generate a random 256-bit encryption key
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = vec![0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Create from a slice (validates length)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        match slice.len() {
            16 | 24 | 32 => Ok(Self(slice.to_vec())),
            n => Err(StratusError::InvalidKeyLength {
                expected: "16, 24 or 32",
                actual: n,
            }),
        }
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

fn seal(key: &EncryptionKey, nonce: &Nonce<U12>, plaintext: &[u8]) -> Result<Vec<u8>> {
    let map_err = |_| StratusError::Encryption("AEAD encryption failed".to_string());
    match key.as_bytes().len() {
        16 => Aes128Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| StratusError::Encryption(e.to_string()))?
            .encrypt(nonce, plaintext)
            .map_err(map_err),
        24 => Aes192Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| StratusError::Encryption(e.to_string()))?
            .encrypt(nonce, plaintext)
            .map_err(map_err),
        32 => Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| StratusError::Encryption(e.to_string()))?
            .encrypt(nonce, plaintext)
            .map_err(map_err),
        n => Err(StratusError::InvalidKeyLength {
            expected: "16, 24 or 32",
            actual: n,
        }),
    }
}

fn open(key: &EncryptionKey, nonce: &Nonce<U12>, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let map_err = |_| StratusError::Decryption("authentication failed".to_string());
    match key.as_bytes().len() {
        16 => Aes128Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| StratusError::Decryption(e.to_string()))?
            .decrypt(nonce, ciphertext)
            .map_err(map_err),
        24 => Aes192Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| StratusError::Decryption(e.to_string()))?
            .decrypt(nonce, ciphertext)
            .map_err(map_err),
        32 => Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| StratusError::Decryption(e.to_string()))?
            .decrypt(nonce, ciphertext)
            .map_err(map_err),
        n => Err(StratusError::InvalidKeyLength {
            expected: "16, 24 or 32",
            actual: n,
        }),
    }
}

/// Encrypt data, returning `nonce || ciphertext || tag`
pub fn encrypt_to_bytes(plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    use rand::RngCore;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = seal(key, nonce, plaintext)?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data from `nonce || ciphertext || tag`
pub fn decrypt_from_bytes(data: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(StratusError::Decryption(
            "data too short for encrypted content".to_string(),
        ));
    }

    let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
    open(key, nonce, &data[NONCE_SIZE..])
}

//! Metadata client
//!
//! Typed access to metadata records within one namespace, over any
//! [`MetaDb`] implementation.

use crate::db::MetaDb;
use crate::encoding::{decode_metadata, encode_metadata};
use crate::types::Metadata;
use std::sync::Arc;
use stratus_core::{Result, StratusError};

/// Namespaced, typed metadata store client
#[derive(Clone)]
pub struct MetaClient {
    db: Arc<dyn MetaDb>,
    namespace: String,
}

impl MetaClient {
    /// Create a client bound to a namespace
    pub fn new(db: Arc<dyn MetaDb>, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(StratusError::InvalidInput(
                "metadata namespace is empty".to_string(),
            ));
        }
        Ok(Self { db, namespace })
    }

    /// The namespace this client operates in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Store a record under its own key, replacing any prior record
    pub async fn set_metadata(&self, metadata: &Metadata) -> Result<()> {
        metadata.validate()?;
        let encoded = encode_metadata(metadata)?;
        self.db.set(&self.namespace, &metadata.key, &encoded).await
    }

    /// Fetch the record stored under `key`
    pub async fn get_metadata(&self, key: &[u8]) -> Result<Metadata> {
        if key.is_empty() {
            return Err(StratusError::InvalidInput(
                "metadata key is empty".to_string(),
            ));
        }
        let encoded = self.db.get(&self.namespace, key).await?;
        decode_metadata(&encoded)
    }

    /// Remove the record stored under `key`; missing keys are a no-op
    pub async fn delete_metadata(&self, key: &[u8]) -> Result<()> {
        self.db.delete(&self.namespace, key).await
    }

    /// Atomically transform the record under `key`.
    ///
    /// The callback may run multiple times on store-level conflicts and must
    /// therefore be idempotent.
    pub async fn update_metadata<F>(&self, key: &[u8], apply: F) -> Result<Metadata>
    where
        F: Fn(Metadata) -> Result<Metadata> + Send + Sync,
    {
        let new_encoded = self
            .db
            .update(&self.namespace, key, &|current: &[u8]| {
                let metadata = decode_metadata(current)?;
                let updated = apply(metadata)?;
                updated.validate()?;
                encode_metadata(&updated)
            })
            .await?;
        decode_metadata(&new_encoded)
    }

    /// Visit the key of every record in the namespace
    pub async fn list_keys(&self, visit: &mut (dyn FnMut(Vec<u8>) + Send)) -> Result<()> {
        self.db.list_keys(&self.namespace, visit).await
    }

    /// Release the underlying store's resources
    pub async fn close(&self) -> Result<()> {
        self.db.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMetaDb;
    use crate::types::{Chunk, ObjectLocation};
    use stratus_core::BlockHasher;

    fn client() -> MetaClient {
        MetaClient::new(Arc::new(MemoryMetaDb::new()), "testns").unwrap()
    }

    fn record(key: &[u8]) -> Metadata {
        let mut meta = Metadata::new(key.to_vec(), 10, 10);
        meta.size = 4;
        meta.chunks = vec![Chunk {
            size: 4,
            hash: BlockHasher::new().hash_bytes(b"data"),
            objects: vec![ObjectLocation {
                shard_id: "shard-0".to_string(),
                key: vec![9; 32],
            }],
        }];
        meta
    }

    #[test]
    fn test_empty_namespace_rejected() {
        assert!(MetaClient::new(Arc::new(MemoryMetaDb::new()), "").is_err());
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let client = client();
        let meta = record(b"key-1");
        client.set_metadata(&meta).await.unwrap();
        assert_eq!(client.get_metadata(b"key-1").await.unwrap(), meta);
    }

    #[tokio::test]
    async fn test_get_missing() {
        assert!(matches!(
            client().get_metadata(b"missing").await,
            Err(StratusError::KeyNotFound)
        ));
    }

    #[tokio::test]
    async fn test_get_empty_key_rejected() {
        assert!(matches!(
            client().get_metadata(b"").await,
            Err(StratusError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_update_links_record() {
        let client = client();
        client.set_metadata(&record(b"key-1")).await.unwrap();

        let updated = client
            .update_metadata(b"key-1", |mut meta| {
                meta.next_key = Some(b"key-2".to_vec());
                Ok(meta)
            })
            .await
            .unwrap();

        assert_eq!(updated.next_key.as_deref(), Some(&b"key-2"[..]));
        let fetched = client.get_metadata(b"key-1").await.unwrap();
        assert_eq!(fetched.next_key.as_deref(), Some(&b"key-2"[..]));
    }

    #[tokio::test]
    async fn test_delete() {
        let client = client();
        client.set_metadata(&record(b"key-1")).await.unwrap();
        client.delete_metadata(b"key-1").await.unwrap();
        assert!(client.get_metadata(b"key-1").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_record_rejected_on_set() {
        let client = client();
        let mut meta = record(b"key-1");
        meta.size = 999;
        assert!(client.set_metadata(&meta).await.is_err());
    }

    #[tokio::test]
    async fn test_list_keys() {
        let client = client();
        client.set_metadata(&record(b"a")).await.unwrap();
        client.set_metadata(&record(b"b")).await.unwrap();

        let mut keys = Vec::new();
        client.list_keys(&mut |k| keys.push(k)).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}

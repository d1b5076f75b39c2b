//! In-memory shard
//!
//! Used for testing and embedded setups. Content-addressed like a real
//! shard: the object key is the BLAKE2b-256 fingerprint of the stored bytes.

use crate::client::{NamespaceInfo, ObjectKey, ObjectStatus, ShardClient};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use stratus_core::{BlockHasher, Result, StratusError};

/// In-memory shard client
pub struct MemoryShard {
    id: String,
    namespace: String,
    objects: RwLock<HashMap<ObjectKey, Bytes>>,
    /// Keys marked corrupted via [`MemoryShard::mark_corrupted`]
    corrupted: RwLock<HashSet<ObjectKey>>,
    /// Maximum capacity in bytes (0 = unlimited)
    max_capacity: u64,
    bytes_used: AtomicU64,
    offline: AtomicBool,
    hasher: BlockHasher,
}

impl MemoryShard {
    /// Create a new unbounded in-memory shard
    pub fn new(id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::with_capacity(id, namespace, 0)
    }

    /// Create an in-memory shard with a capacity limit in bytes
    pub fn with_capacity(id: impl Into<String>, namespace: impl Into<String>, max_bytes: u64) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
            objects: RwLock::new(HashMap::new()),
            corrupted: RwLock::new(HashSet::new()),
            max_capacity: max_bytes,
            bytes_used: AtomicU64::new(0),
            offline: AtomicBool::new(false),
            hasher: BlockHasher::new(),
        }
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Simulate corruption of a stored object
    pub fn mark_corrupted(&self, key: &[u8]) {
        self.corrupted.write().insert(key.to_vec());
    }

    /// Simulate the shard going away (every call fails with a network error)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StratusError::Network(format!(
                "shard {} unreachable",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ShardClient for MemoryShard {
    fn identifier(&self) -> &str {
        &self.id
    }

    async fn put_object(&self, data: Bytes) -> Result<ObjectKey> {
        self.check_online()?;

        let data_len = data.len() as u64;
        if self.max_capacity > 0 {
            let current = self.bytes_used.load(Ordering::SeqCst);
            if current + data_len > self.max_capacity {
                return Err(StratusError::NamespaceFull);
            }
        }

        let key = self.hasher.hash_bytes(&data).as_bytes().to_vec();

        let mut objects = self.objects.write();
        // content-addressed: re-putting identical bytes is a no-op
        if objects.insert(key.clone(), data).is_none() {
            self.bytes_used.fetch_add(data_len, Ordering::SeqCst);
        }
        Ok(key)
    }

    async fn get_object(&self, key: &[u8]) -> Result<Bytes> {
        self.check_online()?;

        if self.corrupted.read().contains(key) {
            return Err(StratusError::Corrupted);
        }
        match self.objects.read().get(key) {
            Some(data) => Ok(data.clone()),
            None => Err(StratusError::KeyNotFound),
        }
    }

    async fn delete_object(&self, key: &[u8]) -> Result<()> {
        self.check_online()?;

        if let Some(old) = self.objects.write().remove(key) {
            self.bytes_used.fetch_sub(old.len() as u64, Ordering::SeqCst);
        }
        self.corrupted.write().remove(key);
        Ok(())
    }

    async fn object_status(&self, key: &[u8]) -> Result<ObjectStatus> {
        self.check_online()?;

        if self.corrupted.read().contains(key) {
            return Ok(ObjectStatus::Corrupted);
        }
        if self.objects.read().contains_key(key) {
            Ok(ObjectStatus::Ok)
        } else {
            Ok(ObjectStatus::Missing)
        }
    }

    async fn list_object_keys(&self, visit: &mut (dyn FnMut(ObjectKey) + Send)) -> Result<()> {
        self.check_online()?;

        for key in self.objects.read().keys() {
            visit(key.clone());
        }
        Ok(())
    }

    async fn namespace_info(&self) -> Result<NamespaceInfo> {
        self.check_online()?;

        Ok(NamespaceInfo {
            label: self.namespace.clone(),
            nr_objects: self.object_count() as u64,
            used: self.bytes_used.load(Ordering::SeqCst),
            free: if self.max_capacity == 0 {
                u64::MAX
            } else {
                self.max_capacity
                    .saturating_sub(self.bytes_used.load(Ordering::SeqCst))
            },
            health: Default::default(),
        })
    }

    fn utilization(&self) -> u64 {
        self.bytes_used.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_content_addressed() {
        let shard = MemoryShard::new("shard-0", "test");
        let data = Bytes::from_static(b"hello world");

        let key1 = shard.put_object(data.clone()).await.unwrap();
        let key2 = shard.put_object(data.clone()).await.unwrap();
        assert_eq!(key1, key2);
        assert_eq!(shard.object_count(), 1);

        let fetched = shard.get_object(&key1).await.unwrap();
        assert_eq!(fetched, data);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let shard = MemoryShard::new("shard-0", "test");
        shard.delete_object(b"no such key").await.unwrap();
    }

    #[tokio::test]
    async fn test_status_and_exists() {
        let shard = MemoryShard::new("shard-0", "test");
        let key = shard.put_object(Bytes::from_static(b"data")).await.unwrap();

        assert_eq!(
            shard.object_status(&key).await.unwrap(),
            ObjectStatus::Ok
        );
        assert!(shard.exist_object(&key).await.unwrap());
        assert!(!shard.exist_object(b"missing").await.unwrap());

        shard.mark_corrupted(&key);
        assert_eq!(
            shard.object_status(&key).await.unwrap(),
            ObjectStatus::Corrupted
        );
        assert!(matches!(
            shard.exist_object(&key).await,
            Err(StratusError::Corrupted)
        ));
        assert!(matches!(
            shard.get_object(&key).await,
            Err(StratusError::Corrupted)
        ));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let shard = MemoryShard::with_capacity("shard-0", "test", 16);
        shard
            .put_object(Bytes::from(vec![1u8; 10]))
            .await
            .unwrap();

        let err = shard.put_object(Bytes::from(vec![2u8; 10])).await;
        assert!(matches!(err, Err(StratusError::NamespaceFull)));
    }

    #[tokio::test]
    async fn test_offline_shard() {
        let shard = MemoryShard::new("shard-0", "test");
        let key = shard.put_object(Bytes::from_static(b"x")).await.unwrap();

        shard.set_offline(true);
        assert!(shard.get_object(&key).await.is_err());
        assert!(shard.put_object(Bytes::from_static(b"y")).await.is_err());

        shard.set_offline(false);
        assert!(shard.get_object(&key).await.is_ok());
    }

    #[tokio::test]
    async fn test_utilization_tracking() {
        let shard = MemoryShard::new("shard-0", "test");
        assert_eq!(shard.utilization(), 0);

        let key = shard
            .put_object(Bytes::from(vec![0u8; 100]))
            .await
            .unwrap();
        assert_eq!(shard.utilization(), 100);

        shard.delete_object(&key).await.unwrap();
        assert_eq!(shard.utilization(), 0);
    }

    #[tokio::test]
    async fn test_list_object_keys() {
        let shard = MemoryShard::new("shard-0", "test");
        for i in 0..5u8 {
            shard.put_object(Bytes::from(vec![i; 8])).await.unwrap();
        }

        let mut listed = Vec::new();
        shard
            .list_object_keys(&mut |key| listed.push(key))
            .await
            .unwrap();
        assert_eq!(listed.len(), 5);
    }

    #[tokio::test]
    async fn test_namespace_info() {
        let shard = MemoryShard::with_capacity("shard-0", "ns1", 1000);
        shard
            .put_object(Bytes::from(vec![0u8; 100]))
            .await
            .unwrap();

        let info = shard.namespace_info().await.unwrap();
        assert_eq!(info.label, "ns1");
        assert_eq!(info.nr_objects, 1);
        assert_eq!(info.used, 100);
        assert_eq!(info.free, 900);
    }
}

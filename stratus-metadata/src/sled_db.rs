//! Sled-backed metadata database
//!
//! The embedded local engine: one sled tree per namespace, records encoded
//! by [`crate::encoding`]. `update` runs a compare-and-swap loop, retrying
//! the callback whenever a concurrent writer got in between.

use crate::db::{MetaDb, UpdateCallback};
use async_trait::async_trait;
use std::path::Path;
use stratus_core::{Result, StratusError};
use tracing::{debug, info};

/// Sled-backed [`MetaDb`]
pub struct SledMetaDb {
    db: sled::Db,
}

fn map_sled_err(err: sled::Error) -> StratusError {
    StratusError::MetaStore(err.to_string())
}

impl SledMetaDb {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!(path = ?path.as_ref(), "opening sled metadata store");
        let db = sled::open(path.as_ref()).map_err(map_sled_err)?;
        Ok(Self { db })
    }

    /// Open a temporary database (for testing)
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(map_sled_err)?;
        Ok(Self { db })
    }

    fn tree(&self, namespace: &str) -> Result<sled::Tree> {
        self.db.open_tree(namespace).map_err(map_sled_err)
    }
}

#[async_trait]
impl MetaDb for SledMetaDb {
    async fn set(&self, namespace: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree(namespace)?
            .insert(key, value)
            .map_err(map_sled_err)?;
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &[u8]) -> Result<Vec<u8>> {
        self.tree(namespace)?
            .get(key)
            .map_err(map_sled_err)?
            .map(|ivec| ivec.to_vec())
            .ok_or(StratusError::KeyNotFound)
    }

    async fn delete(&self, namespace: &str, key: &[u8]) -> Result<()> {
        self.tree(namespace)?.remove(key).map_err(map_sled_err)?;
        Ok(())
    }

    async fn update(
        &self,
        namespace: &str,
        key: &[u8],
        apply: UpdateCallback<'_>,
    ) -> Result<Vec<u8>> {
        let tree = self.tree(namespace)?;

        loop {
            let current = tree
                .get(key)
                .map_err(map_sled_err)?
                .ok_or(StratusError::KeyNotFound)?;
            let new_value = apply(&current)?;

            match tree
                .compare_and_swap(key, Some(&current), Some(new_value.clone()))
                .map_err(map_sled_err)?
            {
                Ok(()) => return Ok(new_value),
                Err(_conflict) => {
                    debug!(namespace, "conflicting metadata update, retrying callback");
                }
            }
        }
    }

    async fn list_keys(
        &self,
        namespace: &str,
        visit: &mut (dyn FnMut(Vec<u8>) + Send),
    ) -> Result<()> {
        for item in self.tree(namespace)?.iter() {
            let (key, _) = item.map_err(map_sled_err)?;
            visit(key.to_vec());
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.db.flush_async().await.map_err(map_sled_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let db = SledMetaDb::open_temporary().unwrap();
        db.set("ns", b"key", b"value").await.unwrap();
        assert_eq!(db.get("ns", b"key").await.unwrap(), b"value");
    }

    #[tokio::test]
    async fn test_missing_key() {
        let db = SledMetaDb::open_temporary().unwrap();
        assert!(matches!(
            db.get("ns", b"missing").await,
            Err(StratusError::KeyNotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let db = SledMetaDb::open_temporary().unwrap();
        db.set("ns", b"key", b"value").await.unwrap();
        db.delete("ns", b"key").await.unwrap();
        db.delete("ns", b"key").await.unwrap();
        assert!(db.get("ns", b"key").await.is_err());
    }

    #[tokio::test]
    async fn test_update_applies_callback() {
        let db = SledMetaDb::open_temporary().unwrap();
        db.set("ns", b"counter", &[0]).await.unwrap();

        for expected in 1..=3u8 {
            let new = db
                .update("ns", b"counter", &|current| Ok(vec![current[0] + 1]))
                .await
                .unwrap();
            assert_eq!(new, vec![expected]);
        }
    }

    #[tokio::test]
    async fn test_update_missing_key() {
        let db = SledMetaDb::open_temporary().unwrap();
        assert!(matches!(
            db.update("ns", b"missing", &|v| Ok(v.to_vec())).await,
            Err(StratusError::KeyNotFound)
        ));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let db = SledMetaDb::open_temporary().unwrap();
        db.set("a", b"k", b"va").await.unwrap();
        db.set("b", b"k", b"vb").await.unwrap();

        assert_eq!(db.get("a", b"k").await.unwrap(), b"va");
        assert_eq!(db.get("b", b"k").await.unwrap(), b"vb");
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = SledMetaDb::open(dir.path()).unwrap();
            db.set("ns", b"key", b"value").await.unwrap();
            db.close().await.unwrap();
        }
        let db = SledMetaDb::open(dir.path()).unwrap();
        assert_eq!(db.get("ns", b"key").await.unwrap(), b"value");
    }
}

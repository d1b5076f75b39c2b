//! In-memory metadata database, for tests and embedded setups

use crate::db::{MetaDb, UpdateCallback};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use stratus_core::{Result, StratusError};

/// In-memory [`MetaDb`]
#[derive(Default)]
pub struct MemoryMetaDb {
    namespaces: RwLock<HashMap<String, HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryMetaDb {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetaDb for MemoryMetaDb {
    async fn set(&self, namespace: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &[u8]) -> Result<Vec<u8>> {
        self.namespaces
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
            .ok_or(StratusError::KeyNotFound)
    }

    async fn delete(&self, namespace: &str, key: &[u8]) -> Result<()> {
        if let Some(ns) = self.namespaces.write().get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn update(
        &self,
        namespace: &str,
        key: &[u8],
        apply: UpdateCallback<'_>,
    ) -> Result<Vec<u8>> {
        // the write lock makes the read-modify-write atomic, so the callback
        // never observes a conflict here
        let mut namespaces = self.namespaces.write();
        let ns = namespaces
            .get_mut(namespace)
            .ok_or(StratusError::KeyNotFound)?;
        let current = ns.get(key).ok_or(StratusError::KeyNotFound)?;
        let new_value = apply(current)?;
        ns.insert(key.to_vec(), new_value.clone());
        Ok(new_value)
    }

    async fn list_keys(
        &self,
        namespace: &str,
        visit: &mut (dyn FnMut(Vec<u8>) + Send),
    ) -> Result<()> {
        if let Some(ns) = self.namespaces.read().get(namespace) {
            for key in ns.keys() {
                visit(key.clone());
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

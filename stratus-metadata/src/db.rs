//! Metadata database abstraction
//!
//! A [`MetaDb`] is a namespaced key/value store for encoded metadata
//! records. Implementations must surface a missing key as
//! [`stratus_core::StratusError::KeyNotFound`], distinct from any transport
//! failure, and must retry the `update` callback on optimistic-concurrency
//! conflicts; callers provide idempotent callbacks.

use async_trait::async_trait;
use stratus_core::Result;

/// Read-modify-write callback: receives the current value, returns the new
/// one. May run more than once if the store detects a conflicting writer.
pub type UpdateCallback<'a> = &'a (dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync);

/// Namespaced key/value store for serialized metadata
#[async_trait]
pub trait MetaDb: Send + Sync {
    /// Store a value under `key` within `namespace`, replacing any prior one
    async fn set(&self, namespace: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Fetch the value under `key`; fails with `KeyNotFound` when absent
    async fn get(&self, namespace: &str, key: &[u8]) -> Result<Vec<u8>>;

    /// Remove the value under `key`. Deleting a missing key is a no-op.
    async fn delete(&self, namespace: &str, key: &[u8]) -> Result<()>;

    /// Atomically transform the value under `key` and return the new value.
    ///
    /// Fails with `KeyNotFound` when the key is absent.
    async fn update(
        &self,
        namespace: &str,
        key: &[u8],
        apply: UpdateCallback<'_>,
    ) -> Result<Vec<u8>>;

    /// Visit every key stored in `namespace`
    async fn list_keys(
        &self,
        namespace: &str,
        visit: &mut (dyn FnMut(Vec<u8>) + Send),
    ) -> Result<()>;

    /// Release any open resources
    async fn close(&self) -> Result<()>;
}

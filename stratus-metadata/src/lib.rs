//! Stratus metadata layer
//!
//! The metadata record model ([`types::Metadata`]), its version-tagged
//! binary encoding, the [`db::MetaDb`] store abstraction with in-memory and
//! embedded sled implementations, and the namespaced [`client::MetaClient`].

pub mod client;
pub mod db;
pub mod encoding;
pub mod memory;
pub mod sled_db;
pub mod types;

pub use client::MetaClient;
pub use db::{MetaDb, UpdateCallback};
pub use encoding::{decode_metadata, encode_metadata, METADATA_VERSION};
pub use memory::MemoryMetaDb;
pub use sled_db::SledMetaDb;
pub use types::{Chunk, Metadata, ObjectLocation};

//! Durable key-value persistence
//!
//! The lifecycle manager addresses storage by string key and treats values as
//! opaque blobs. Absence is part of the contract (`Ok(None)` from `get`,
//! `Ok(false)` from `delete`), not an error.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Durable store for opaque blobs addressed by string keys.
pub trait PersistentStore {
    /// Fetch the blob stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, replacing any previous blob.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Delete the blob under `key`. Returns whether a blob existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

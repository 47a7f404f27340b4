//! Device-wide key-value storage for UberFix.
//!
//! Two backends share the [`KeyValueStore`] trait:
//! - [`MemoryStore`]: process-local, used by tests and one-shot commands
//! - [`FileStore`]: a JSON object at `~/.uberfix/storage.json`, shared by
//!   every process on the device (last writer wins)
//!
//! [`ExpiringCache`] layers TTL semantics on top of either backend.

mod expiring;
mod file;
mod keys;
mod memory;
mod traits;

pub use expiring::{ExpiringCache, EXPIRY_SUFFIX};
pub use file::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend refused the operation
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Stored document could not be decoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

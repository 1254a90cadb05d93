//! Key-addressed object storage used by the generator and the resolver.
//!
//! The store is the only shared mutable resource. Keys are written whole
//! (create-or-overwrite from a complete buffer) and never mutated in place.

use std::time::Duration;

use async_trait::async_trait;

pub mod fs;
#[cfg(test)]
pub mod memory;
pub mod s3;

pub use fs::FsStore;
#[cfg(test)]
pub use memory::MemoryStore;
pub use s3::S3Store;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("write failed for {key}: {message}")]
    Write { key: String, message: String },

    #[error("cannot presign {key}: {message}")]
    Presign { key: String, message: String },

    #[error("storage error for {key}: {message}")]
    Backend { key: String, message: String },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// A fully computed object body plus the headers stored with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub cache_control: Option<String>,
}

/// Information about an object from list/head operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the full object. A missing key is [`StorageError::NotFound`].
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Create or overwrite `key` with the complete body.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        object: PutObject,
    ) -> Result<(), StorageError>;

    /// Returns None if the object doesn't exist.
    async fn head_object(&self, bucket: &str, key: &str)
        -> Result<Option<ObjectInfo>, StorageError>;

    /// Build a time-limited GET URL without checking that the object exists.
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    /// List every object whose key starts with `prefix`.
    async fn list_objects(&self, bucket: &str, prefix: &str)
        -> Result<Vec<ObjectInfo>, StorageError>;

    /// Presign a GET URL for an object that must exist.
    async fn presign_existing(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        if self.head_object(bucket, key).await?.is_none() {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }
        self.presign_get(bucket, key, expires_in).await
    }
}

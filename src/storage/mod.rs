//! Blob storage for submitted documents
//!
//! A [`BlobStore`] writes bytes under a path and hands back a publicly
//! resolvable URL. Writing the same path twice overwrites the blob.

mod gcs;
mod local;
mod service_account;

use async_trait::async_trait;

pub use gcs::GcsBlobStore;
pub use local::LocalBlobStore;
pub use service_account::ServiceAccountAuth;

use crate::Result;

/// Durable blob storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` and return its public URL
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Which blob backend stores documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Files under the data directory, served by the gateway itself
    #[default]
    Local,
    /// Google Cloud Storage / Firebase Storage bucket
    Gcs,
}

impl StorageBackend {
    /// Parse from string representation
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gcs" | "firebase" => Self::Gcs,
            _ => Self::Local,
        }
    }
}

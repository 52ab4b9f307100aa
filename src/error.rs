//! Error types for Docket gateway

use thiserror::Error;

/// Result type alias for Docket operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Docket gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Media download from the messaging provider failed
    #[error("media fetch error: {0}")]
    MediaFetch(String),

    /// Blob storage error
    #[error("blob store error: {0}")]
    BlobStore(String),

    /// Document metadata store error
    #[error("metadata store error: {0}")]
    MetadataStore(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

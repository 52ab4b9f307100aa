//! Document intake pipeline
//!
//! Moves a submitted media item from the messaging provider into blob
//! storage and records its metadata. The three external calls run in order
//! and each failure is reported with the step it happened at, so a caller
//! can retry from that point.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::time::Instant;

use crate::conversation::{DocumentType, MediaRef};
use crate::documents::{DocumentRecord, MetadataStore, NewDocument};
use crate::media::MediaFetcher;
use crate::storage::BlobStore;

/// Prefix for stored document blobs
pub const BLOB_PREFIX: &str = "documents";

/// Pipeline step, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStep {
    MediaFetch,
    BlobStore,
    MetadataStore,
}

impl fmt::Display for IntakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MediaFetch => write!(f, "media_fetch"),
            Self::BlobStore => write!(f, "blob_store"),
            Self::MetadataStore => write!(f, "metadata_store"),
        }
    }
}

/// Failure at one step of [`IntakePipeline::ingest`]
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Nothing was written
    #[error("media fetch failed: {reason}")]
    MediaFetch { reason: String },

    /// Media was downloaded but the blob was not stored
    #[error("blob upload of {filename} failed: {reason}")]
    BlobStore { filename: String, reason: String },

    /// The blob is stored at `url` but has no metadata record
    #[error("metadata insert for {filename} failed: {reason}")]
    MetadataStore {
        filename: String,
        url: String,
        reason: String,
    },
}

impl IntakeError {
    /// Which step failed
    #[must_use]
    pub const fn step(&self) -> IntakeStep {
        match self {
            Self::MediaFetch { .. } => IntakeStep::MediaFetch,
            Self::BlobStore { .. } => IntakeStep::BlobStore,
            Self::MetadataStore { .. } => IntakeStep::MetadataStore,
        }
    }

    /// Whether a blob without metadata was left behind
    #[must_use]
    pub const fn left_orphan_blob(&self) -> bool {
        matches!(self, Self::MetadataStore { .. })
    }
}

/// Fetch → store blob → insert metadata
#[derive(Clone)]
pub struct IntakePipeline {
    fetcher: Arc<dyn MediaFetcher>,
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    deadline: Option<Duration>,
}

impl IntakePipeline {
    /// Create a pipeline over its three collaborators
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            fetcher,
            blobs,
            metadata,
            deadline: None,
        }
    }

    /// Fail whichever step is running once `deadline` has passed since the
    /// intake started
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Materialize a submitted document for `owner`
    ///
    /// # Errors
    ///
    /// Returns the step that failed; success is only reported when all three
    /// external calls succeeded
    pub async fn ingest(
        &self,
        owner: &str,
        doc_type: &DocumentType,
        media: &MediaRef,
    ) -> std::result::Result<DocumentRecord, IntakeError> {
        let deadline = self.deadline.map(|d| Instant::now() + d);

        let bytes = within(deadline, self.fetcher.fetch(&media.url))
            .await
            .map_err(|reason| IntakeError::MediaFetch { reason })?;

        let filename = derive_filename(doc_type, &media.message_id, &media.content_type);
        let path = format!("{BLOB_PREFIX}/{filename}");

        let url = within(deadline, self.blobs.put(&path, bytes, &media.content_type))
            .await
            .map_err(|reason| IntakeError::BlobStore {
                filename: filename.clone(),
                reason,
            })?;

        let document = NewDocument {
            filename: filename.clone(),
            content_type: media.content_type.clone(),
            url: url.clone(),
            doc_type: doc_type.clone(),
            owner: owner.to_string(),
        };

        let id = within(deadline, self.metadata.insert(&document))
            .await
            .map_err(|reason| IntakeError::MetadataStore {
                filename: filename.clone(),
                url: url.clone(),
                reason,
            })?;

        tracing::info!(owner, doc_type = %doc_type.id, filename, "document stored");

        Ok(DocumentRecord {
            id,
            filename,
            content_type: document.content_type,
            url,
            doc_type: document.doc_type,
            owner: document.owner,
            created_at: chrono::Utc::now(),
        })
    }
}

/// Run one step, failing it if the intake deadline passes first
async fn within<T>(
    deadline: Option<Instant>,
    step: impl Future<Output = crate::Result<T>>,
) -> std::result::Result<T, String> {
    let result = match deadline {
        Some(at) => tokio::time::timeout_at(at, step)
            .await
            .map_err(|_| "intake deadline exceeded".to_string())?,
        None => step.await,
    };
    result.map_err(|e| e.to_string())
}

/// `{doc_type}_{message_id}.{ext}`
///
/// Derived only from the provider message id, so a re-delivered message maps
/// to the same blob. When characters had to be stripped from the id, a short
/// digest of the raw id is appended so distinct ids stay distinct.
#[must_use]
pub fn derive_filename(doc_type: &DocumentType, message_id: &str, content_type: &str) -> String {
    let cleaned: String = message_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    let id = if cleaned == message_id {
        cleaned
    } else {
        let digest = Sha256::digest(message_id.as_bytes());
        let short = hex::encode(&digest[..6]);
        if cleaned.is_empty() {
            short
        } else {
            format!("{cleaned}-{short}")
        }
    };

    format!(
        "{}_{}.{}",
        doc_type.id,
        id,
        extension_from_content_type(content_type)
    )
}

/// File extension from a MIME type's subtype
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> String {
    let subtype = content_type
        .split(';')
        .next()
        .and_then(|essence| essence.split('/').nth(1))
        .unwrap_or_default();

    let ext: String = subtype
        .trim()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();

    if ext.is_empty() { "bin".to_string() } else { ext }
}

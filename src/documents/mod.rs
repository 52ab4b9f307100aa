//! Document metadata and the owner-scoped query path

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};

use crate::Result;
use crate::conversation::DocumentType;

/// A stored document's metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    /// Record identifier
    pub id: String,
    /// Blob filename, unique per provider message
    pub filename: String,
    /// MIME type of the stored blob
    pub content_type: String,
    /// Public URL of the stored blob
    pub url: String,
    /// Document category
    pub doc_type: DocumentType,
    /// Sender identifier of the user who submitted it
    pub owner: String,
    /// Insertion time
    pub created_at: DateTime<Utc>,
}

/// A record to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub filename: String,
    pub content_type: String,
    pub url: String,
    pub doc_type: DocumentType,
    pub owner: String,
}

/// Owner-scoped filter for [`MetadataStore::query`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFilter {
    pub owner: String,
    /// Restrict to one document type id
    pub doc_type: Option<String>,
}

impl DocumentFilter {
    /// All documents of an owner
    #[must_use]
    pub fn owner(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            doc_type: None,
        }
    }

    /// Restrict to a document type
    #[must_use]
    pub fn of_type(mut self, doc_type: &DocumentType) -> Self {
        self.doc_type = Some(doc_type.id.clone());
        self
    }
}

/// Durable store for document metadata
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record and return its identifier
    ///
    /// Inserting a record whose filename already exists updates that record
    /// in place and returns its existing identifier.
    async fn insert(&self, document: &NewDocument) -> Result<String>;

    /// Records matching the filter, most recently inserted first
    async fn query(&self, filter: &DocumentFilter) -> Result<Vec<DocumentRecord>>;
}

/// Deterministic lookups over a [`MetadataStore`]
#[derive(Clone)]
pub struct DocumentQuery {
    store: Arc<dyn MetadataStore>,
}

impl DocumentQuery {
    /// Create a query helper over a store
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// The owner's document of this type
    ///
    /// When several submissions exist, the most recently inserted one wins.
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails
    pub async fn find_one(
        &self,
        owner: &str,
        doc_type: &DocumentType,
    ) -> Result<Option<DocumentRecord>> {
        let filter = DocumentFilter::owner(owner).of_type(doc_type);
        let records = self.store.query(&filter).await?;
        Ok(records.into_iter().next())
    }

    /// All of the owner's documents, most recent first
    ///
    /// Each call runs a fresh query; the returned stream is finite.
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails
    pub async fn find_all(&self, owner: &str) -> Result<BoxStream<'static, DocumentRecord>> {
        let records = self.store.query(&DocumentFilter::owner(owner)).await?;
        Ok(Box::pin(stream::iter(records)))
    }
}

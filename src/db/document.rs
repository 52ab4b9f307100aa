//! Document metadata repository

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use super::{DbPool, conn};
use crate::conversation::DocumentType;
use crate::documents::{DocumentFilter, DocumentRecord, MetadataStore, NewDocument};
use crate::{Error, Result};

const SELECT_COLUMNS: &str =
    "SELECT id, filename, content_type, url, doc_type_id, doc_type_label, owner, created_at
     FROM documents";

/// `SQLite`-backed document metadata store
#[derive(Clone)]
pub struct DocumentRepo {
    pool: DbPool,
}

impl DocumentRepo {
    /// Create a new document repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a document record, updating the owner's existing one for the same filename
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn insert_record(&self, document: &NewDocument) -> Result<String> {
        let conn = conn(&self.pool)?;
        let id = Uuid::new_v4().to_string();

        let stored_id: String = conn
            .query_row(
                "INSERT INTO documents
                    (id, filename, content_type, url, doc_type_id, doc_type_label, owner)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(owner, filename) DO UPDATE SET
                    content_type = excluded.content_type,
                    url = excluded.url
                 RETURNING id",
                params![
                    id,
                    document.filename,
                    document.content_type,
                    document.url,
                    document.doc_type.id,
                    document.doc_type.label,
                    document.owner,
                ],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(stored_id)
    }

    /// List records matching a filter, most recently inserted first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list(&self, filter: &DocumentFilter) -> Result<Vec<DocumentRecord>> {
        let conn = conn(&self.pool)?;

        let records = if let Some(doc_type) = &filter.doc_type {
            let mut stmt = conn
                .prepare(&format!(
                    "{SELECT_COLUMNS} WHERE owner = ?1 AND doc_type_id = ?2 ORDER BY seq DESC"
                ))
                .map_err(|e| Error::Database(e.to_string()))?;
            let rows = stmt
                .query_map([filter.owner.as_str(), doc_type.as_str()], row_to_record)
                .map_err(|e| Error::Database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>();
            rows
        } else {
            let mut stmt = conn
                .prepare(&format!("{SELECT_COLUMNS} WHERE owner = ?1 ORDER BY seq DESC"))
                .map_err(|e| Error::Database(e.to_string()))?;
            let rows = stmt
                .query_map([filter.owner.as_str()], row_to_record)
                .map_err(|e| Error::Database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>();
            rows
        };

        records.map_err(|e| Error::Database(e.to_string()))
    }

    /// Count stored records
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self) -> Result<usize> {
        let conn = conn(&self.pool)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl MetadataStore for DocumentRepo {
    async fn insert(&self, document: &NewDocument) -> Result<String> {
        self.insert_record(document)
            .map_err(|e| Error::MetadataStore(format!("insert of {} failed: {e}", document.filename)))
    }

    async fn query(&self, filter: &DocumentFilter) -> Result<Vec<DocumentRecord>> {
        self.list(filter)
            .map_err(|e| Error::MetadataStore(format!("query for {} failed: {e}", filter.owner)))
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: row.get(0)?,
        filename: row.get(1)?,
        content_type: row.get(2)?,
        url: row.get(3)?,
        doc_type: DocumentType {
            id: row.get(4)?,
            label: row.get(5)?,
        },
        owner: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

//! Daemon - the main gateway service
//!
//! Wires configuration into stores, the intake pipeline and the dispatcher,
//! then runs the webhook server and the session reaper until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use crate::api::ApiServerBuilder;
use crate::conversation::DialogueEngine;
use crate::db::{self, DbPool, DocumentRepo};
use crate::dispatch::Dispatcher;
use crate::documents::{DocumentQuery, MetadataStore};
use crate::intake::{BLOB_PREFIX, IntakePipeline};
use crate::media::{MediaFetcher, TwilioMediaFetcher};
use crate::sessions::{MemoryStateStore, SessionBackend, SqliteStateStore, StateStore, spawn_reaper};
use crate::storage::{BlobStore, GcsBlobStore, LocalBlobStore, StorageBackend};
use crate::{Config, Error, Result};

/// The Docket daemon - serves the webhook and maintains session state
pub struct Daemon {
    config: Config,
    port: u16,
    db: DbPool,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Errors
    ///
    /// Returns error if the data directory or database cannot be initialized
    pub fn new(config: Config, port: u16) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db = db::init(&config.database_path)?;

        tracing::info!(path = %config.database_path.display(), "database initialized");

        Ok(Self { config, port, db })
    }

    /// Database pool in use
    #[must_use]
    pub const fn db(&self) -> &DbPool {
        &self.db
    }

    /// Build the conversation state store for the configured backend
    #[must_use]
    pub fn state_store(&self) -> Arc<dyn StateStore> {
        match self.config.sessions.backend {
            SessionBackend::Memory => Arc::new(MemoryStateStore::new()),
            SessionBackend::Sqlite => Arc::new(SqliteStateStore::new(self.db.clone())),
        }
    }

    /// Build the blob store for the configured backend
    ///
    /// Also returns the directory to serve under `/documents` when blobs are
    /// kept locally.
    ///
    /// # Errors
    ///
    /// Returns error if the backend is missing settings or cannot be created
    pub fn blob_store(&self) -> Result<(Arc<dyn BlobStore>, Option<PathBuf>)> {
        let storage = &self.config.storage;
        match storage.backend {
            StorageBackend::Local => {
                let store =
                    LocalBlobStore::new(&storage.local_dir, &self.config.server.public_base_url)?;
                let served = store.root().join(BLOB_PREFIX);
                std::fs::create_dir_all(&served)?;
                Ok((Arc::new(store), Some(served)))
            }
            StorageBackend::Gcs => {
                let bucket = storage
                    .bucket
                    .clone()
                    .ok_or_else(|| Error::Config("gcs storage requires a bucket".to_string()))?;
                let credentials = storage.credentials_path.as_deref().ok_or_else(|| {
                    Error::Config("gcs storage requires FIREBASE_CREDENTIALS_PATH".to_string())
                })?;
                let store =
                    GcsBlobStore::new(bucket, credentials, self.config.http.upload_timeout)?;
                Ok((Arc::new(store), None))
            }
        }
    }

    /// Build the message dispatcher around the given stores
    ///
    /// # Errors
    ///
    /// Returns error if provider credentials are missing
    pub fn dispatcher(
        &self,
        states: Arc<dyn StateStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Dispatcher> {
        let (sid, token) = self.config.twilio.credentials()?;
        let fetcher: Arc<dyn MediaFetcher> = Arc::new(TwilioMediaFetcher::new(
            sid,
            token,
            self.config.http.media_fetch_timeout,
        )?);
        let metadata: Arc<dyn MetadataStore> = Arc::new(DocumentRepo::new(self.db.clone()));

        let intake = IntakePipeline::new(fetcher, blobs, metadata.clone())
            .with_deadline(self.config.http.intake_deadline);
        let engine = DialogueEngine::new(self.config.menu.clone());

        Ok(Dispatcher::new(engine, states, intake, DocumentQuery::new(metadata)))
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if startup fails or the server stops with an error
    pub async fn run(self) -> Result<()> {
        let states = self.state_store();
        let (blobs, documents_dir) = self.blob_store()?;
        let dispatcher = self.dispatcher(states.clone(), blobs)?;

        tracing::info!(
            port = self.port,
            storage = ?self.config.storage.backend,
            sessions = ?self.config.sessions.backend,
            "daemon running"
        );

        let reaper = spawn_reaper(
            states,
            self.config.sessions.idle_timeout,
            self.config.sessions.reap_interval,
        );

        let server = ApiServerBuilder::new(self.db.clone(), dispatcher, self.port)
            .documents_dir(documents_dir)
            .webhook_rpm(self.config.server.webhook_rpm)
            .build();
        let mut api_handle = server.spawn();

        let result = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                api_handle.abort();
                Ok(())
            }
            joined = &mut api_handle => match joined {
                Ok(result) => result,
                Err(e) => Err(Error::Config(format!("API server task failed: {e}"))),
            },
        };

        reaper.abort();
        result
    }
}

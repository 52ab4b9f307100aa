//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use docket_gateway::documents::{DocumentFilter, DocumentRecord, MetadataStore, NewDocument};
use docket_gateway::{
    BlobStore, ConversationState, DbPool, DialogueEngine, Dispatcher, DocumentQuery, DocumentRepo,
    Error, InboundMessage, IntakePipeline, MediaFetcher, MemoryStateStore, ReplyCache, Result,
    SqliteStateStore, StateStore, db,
};

pub const USER: &str = "whatsapp:+15550001111";

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Text message from the default test user
pub fn text(sid: &str, body: &str) -> InboundMessage {
    InboundMessage::new(sid, USER, body)
}

/// Media message from the default test user
pub fn media(sid: &str, content_type: &str) -> InboundMessage {
    InboundMessage::new(sid, USER, "").with_media(format!("https://api.twilio.test/{sid}"), content_type)
}

/// Fetcher returning fixed bytes, failing the first `failures` calls
#[derive(Default)]
pub struct FakeFetcher {
    pub calls: AtomicUsize,
    failures: AtomicUsize,
}

impl FakeFetcher {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(failures),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::MediaFetch(format!("{url}: timed out")));
        }
        Ok(format!("bytes of {url}").into_bytes())
    }
}

/// Fetcher that blocks until released, to hold a user in processing
#[derive(Default)]
pub struct GatedFetcher {
    pub entered: Notify,
    pub release: Notify,
    pub calls: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for GatedFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(b"gated".to_vec())
    }
}

/// Blob store keeping blobs in a map
#[derive(Default)]
pub struct MemoryBlobStore {
    pub blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        self.blobs.lock().unwrap().insert(path.to_string(), bytes);
        Ok(format!("https://blobs.test/{path}"))
    }
}

/// Blob store that always fails
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, path: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        Err(Error::BlobStore(format!("{path}: bucket unavailable")))
    }
}

/// Metadata store whose inserts always fail
pub struct FailingMetadataStore;

#[async_trait]
impl MetadataStore for FailingMetadataStore {
    async fn insert(&self, document: &NewDocument) -> Result<String> {
        Err(Error::MetadataStore(format!("{}: write rejected", document.filename)))
    }

    async fn query(&self, _filter: &DocumentFilter) -> Result<Vec<DocumentRecord>> {
        Ok(Vec::new())
    }
}

/// Fetcher that never answers within a test's deadline
pub struct StalledFetcher;

#[async_trait]
impl MediaFetcher for StalledFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

type WriteHook = Box<dyn Fn(&ConversationState, &ConversationState) + Send + Sync>;

/// Memory state store with scripted compare-and-set outcomes
///
/// The first `stale` writes report a stale state without writing. The first
/// of those may instead let a competing delivery win by moving the user to
/// `interloper`.
pub struct ScriptedStateStore {
    inner: MemoryStateStore,
    stale: AtomicUsize,
    interloper: Mutex<Option<ConversationState>>,
    on_write: Option<WriteHook>,
    reads: AtomicUsize,
}

impl Default for ScriptedStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedStateStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStateStore::new(),
            stale: AtomicUsize::new(0),
            interloper: Mutex::new(None),
            on_write: None,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn stale_for(self, writes: usize) -> Self {
        self.stale.store(writes, Ordering::SeqCst);
        self
    }

    pub fn interloper(self, state: ConversationState) -> Self {
        *self.interloper.lock().unwrap() = Some(state);
        self
    }

    /// Observe every attempted write as `(expected, new)` before it runs
    pub fn on_write(
        mut self,
        hook: impl Fn(&ConversationState, &ConversationState) + Send + Sync + 'static,
    ) -> Self {
        self.on_write = Some(Box::new(hook));
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for ScriptedStateStore {
    async fn get(&self, user: &str) -> Result<ConversationState> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(user).await
    }

    async fn compare_and_set(
        &self,
        user: &str,
        expected: &ConversationState,
        new: &ConversationState,
    ) -> Result<bool> {
        if let Some(hook) = &self.on_write {
            hook(expected, new);
        }

        let stale = self
            .stale
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !stale {
            return self.inner.compare_and_set(user, expected, new).await;
        }

        let interloper = self.interloper.lock().unwrap().take();
        if let Some(state) = interloper {
            let current = self.inner.get(user).await?;
            self.inner.compare_and_set(user, &current, &state).await?;
        }
        Ok(false)
    }

    async fn remove(&self, user: &str) -> Result<()> {
        self.inner.remove(user).await
    }

    async fn reap_idle(&self, max_idle: std::time::Duration) -> Result<usize> {
        self.inner.reap_idle(max_idle).await
    }
}

/// Dispatcher and the collaborators tests inspect
pub struct Harness {
    pub db: DbPool,
    pub states: Arc<dyn StateStore>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    /// Dispatcher over an in-memory database with the given fetcher and blob store
    pub fn new(fetcher: Arc<dyn MediaFetcher>, blobs: Arc<dyn BlobStore>) -> Self {
        let db = setup_test_db();
        let metadata: Arc<dyn MetadataStore> = Arc::new(DocumentRepo::new(db.clone()));
        Self::with_metadata(db, fetcher, blobs, metadata)
    }

    pub fn with_metadata(
        db: DbPool,
        fetcher: Arc<dyn MediaFetcher>,
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self::assemble(
            db,
            Arc::new(MemoryStateStore::new()),
            fetcher,
            blobs,
            metadata,
            ReplyCache::default(),
        )
    }

    /// Dispatcher over every collaborator given explicitly
    pub fn assemble(
        db: DbPool,
        states: Arc<dyn StateStore>,
        fetcher: Arc<dyn MediaFetcher>,
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        replies: ReplyCache,
    ) -> Self {
        let intake = IntakePipeline::new(fetcher, blobs, metadata.clone());
        let dispatcher = Dispatcher::new(
            DialogueEngine::default(),
            states.clone(),
            intake,
            DocumentQuery::new(metadata),
        )
        .with_reply_cache(replies);
        Self {
            db,
            states,
            dispatcher,
        }
    }

    /// Working collaborators over a caller-chosen state store and reply cache
    pub fn with_states(
        states: Arc<dyn StateStore>,
        replies: ReplyCache,
    ) -> (Self, Arc<FakeFetcher>, Arc<MemoryBlobStore>) {
        let db = setup_test_db();
        let fetcher = Arc::new(FakeFetcher::default());
        let blobs = Arc::new(MemoryBlobStore::default());
        let metadata: Arc<dyn MetadataStore> = Arc::new(DocumentRepo::new(db.clone()));
        let harness = Self::assemble(db, states, fetcher.clone(), blobs.clone(), metadata, replies);
        (harness, fetcher, blobs)
    }

    /// Dispatcher whose conversation state lives in the `SQLite` table
    pub fn sqlite(fetcher: Arc<dyn MediaFetcher>, blobs: Arc<dyn BlobStore>) -> Self {
        let db = setup_test_db();
        let states: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(db.clone()));
        let metadata: Arc<dyn MetadataStore> = Arc::new(DocumentRepo::new(db.clone()));
        Self::assemble(db, states, fetcher, blobs, metadata, ReplyCache::default())
    }

    /// Default harness with a working fetcher and in-memory blobs
    pub fn working() -> (Self, Arc<FakeFetcher>, Arc<MemoryBlobStore>) {
        let fetcher = Arc::new(FakeFetcher::default());
        let blobs = Arc::new(MemoryBlobStore::default());
        let harness = Self::new(fetcher.clone(), blobs.clone());
        (harness, fetcher, blobs)
    }

    /// Send a message and return the reply text
    pub async fn send(&self, message: &InboundMessage) -> String {
        self.dispatcher
            .handle(message)
            .await
            .expect("dispatch failed")
            .to_string()
    }

    pub fn records(&self) -> Vec<DocumentRecord> {
        DocumentRepo::new(self.db.clone())
            .list(&DocumentFilter::owner(USER))
            .expect("query failed")
    }
}

//! Docket Gateway - guided document intake over WhatsApp
//!
//! This library provides the core functionality for the Docket gateway:
//! - A per-user conversation state machine driven by inbound messages
//! - Document intake (fetch media, store blob, record metadata)
//! - Deterministic retrieval of previously submitted documents
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Twilio WhatsApp webhook                 │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Dispatcher                         │
//! │   State store (CAS)  │  Dialogue engine  │  Replay   │
//! └──────────┬─────────────────────────┬────────────────┘
//!            │                         │
//! ┌──────────▼──────────┐   ┌──────────▼────────────────┐
//! │   Intake pipeline   │   │      Document query       │
//! │ media → blob → meta │   │  newest first per owner   │
//! └─────────────────────┘   └───────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod conversation;
pub mod daemon;
pub mod db;
pub mod dispatch;
pub mod documents;
pub mod error;
pub mod intake;
pub mod media;
pub mod sessions;
pub mod storage;

pub use config::Config;
pub use conversation::{
    ConversationState, DialogueEngine, DocumentType, InboundMessage, MediaRef, MenuOptions, Reply,
};
pub use daemon::Daemon;
pub use db::{DbConn, DbPool, DocumentRepo};
pub use dispatch::{Dispatcher, ReplyCache};
pub use documents::{DocumentFilter, DocumentQuery, DocumentRecord, MetadataStore, NewDocument};
pub use error::{Error, Result};
pub use intake::{IntakeError, IntakePipeline, IntakeStep};
pub use media::{MediaFetcher, TwilioMediaFetcher};
pub use sessions::{MemoryStateStore, SessionBackend, SqliteStateStore, StateStore};
pub use storage::{BlobStore, GcsBlobStore, LocalBlobStore, StorageBackend};

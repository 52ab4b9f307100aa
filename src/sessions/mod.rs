//! Per-user conversation state with compare-and-set transitions
//!
//! Every write goes through [`StateStore::compare_and_set`] so two webhook
//! deliveries for the same user can never both apply conflicting
//! transitions. Absence of an entry is the greeting state.

mod memory;
mod reaper;
mod sqlite;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryStateStore;
pub use reaper::spawn_reaper;
pub use sqlite::SqliteStateStore;

use crate::Result;
use crate::conversation::ConversationState;

/// Storage for per-user conversation state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current state, [`ConversationState::Greeting`] when absent
    async fn get(&self, user: &str) -> Result<ConversationState>;

    /// Replace `expected` with `new` atomically
    ///
    /// Returns `false` without writing when the stored state is not
    /// `expected`. Setting [`ConversationState::Greeting`] removes the entry.
    async fn compare_and_set(
        &self,
        user: &str,
        expected: &ConversationState,
        new: &ConversationState,
    ) -> Result<bool>;

    /// Remove a user's entry unconditionally
    async fn remove(&self, user: &str) -> Result<()>;

    /// Remove entries not written for at least `max_idle`, returning how many
    async fn reap_idle(&self, max_idle: Duration) -> Result<usize>;
}

/// Which state store backs the dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionBackend {
    /// In-process map (single instance)
    #[default]
    Memory,
    /// Shared `SQLite` table (several processes on one database file)
    Sqlite,
}

impl SessionBackend {
    /// Parse from string representation
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sqlite" | "shared" => Self::Sqlite,
            _ => Self::Memory,
        }
    }
}

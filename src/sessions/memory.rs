//! In-process state store

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::StateStore;
use crate::Result;
use crate::conversation::ConversationState;

#[derive(Debug)]
struct Entry {
    state: ConversationState,
    touched: Instant,
}

/// Mutex-guarded map of user to state, for single-instance deployments
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStateStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users not at the greeting
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether every user is at the greeting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, user: &str) -> Result<ConversationState> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(user)
            .map(|e| e.state.clone())
            .unwrap_or_default())
    }

    async fn compare_and_set(
        &self,
        user: &str,
        expected: &ConversationState,
        new: &ConversationState,
    ) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let matches = entries
            .get(user)
            .map_or(expected.is_greeting(), |e| &e.state == expected);
        if !matches {
            return Ok(false);
        }

        if new.is_greeting() {
            entries.remove(user);
        } else {
            entries.insert(
                user.to_string(),
                Entry {
                    state: new.clone(),
                    touched: Instant::now(),
                },
            );
        }

        Ok(true)
    }

    async fn remove(&self, user: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user);
        Ok(())
    }

    async fn reap_idle(&self, max_idle: Duration) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.touched) < max_idle);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sessions::contract;

    #[tokio::test]
    async fn test_unknown_user_is_greeting() {
        contract::unknown_user_is_greeting(&MemoryStateStore::new()).await;
    }

    #[tokio::test]
    async fn test_cas_from_greeting() {
        contract::cas_from_greeting(&MemoryStateStore::new()).await;
    }

    #[tokio::test]
    async fn test_cas_with_payload() {
        let store = MemoryStateStore::new();
        contract::cas_with_payload(&store).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_remove_resets() {
        contract::remove_resets(&MemoryStateStore::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_cas_has_one_winner() {
        contract::concurrent_cas_has_one_winner(Arc::new(MemoryStateStore::new())).await;
    }

    #[tokio::test]
    async fn test_reap_removes_idle() {
        contract::reap_removes_idle(&MemoryStateStore::new()).await;
    }
}

//! Shared state store on the `conversation_state` table
//!
//! Each compare-and-set is a single conditional statement, so it stays
//! atomic across pooled connections and across processes sharing the file.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::StateStore;
use crate::conversation::ConversationState;
use crate::db::{DbPool, conn};
use crate::{Error, Result};

/// `SQLite`-backed state store for multi-process deployments
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: DbPool,
}

impl SqliteStateStore {
    /// Create a store over an initialized pool
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, user: &str) -> Result<ConversationState> {
        let conn = conn(&self.pool)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT state FROM conversation_state WHERE user_id = ?1",
                [user],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(raw.map_or(ConversationState::Greeting, |raw| {
            ConversationState::decode(&raw)
        }))
    }

    async fn compare_and_set(
        &self,
        user: &str,
        expected: &ConversationState,
        new: &ConversationState,
    ) -> Result<bool> {
        let conn = conn(&self.pool)?;
        let now = Utc::now().timestamp_millis();

        let changed = match (expected.is_greeting(), new.is_greeting()) {
            (true, true) => {
                let exists: bool = conn
                    .query_row(
                        "SELECT EXISTS(SELECT 1 FROM conversation_state WHERE user_id = ?1)",
                        [user],
                        |row| row.get(0),
                    )
                    .map_err(|e| Error::Database(e.to_string()))?;
                return Ok(!exists);
            }
            (true, false) => conn.execute(
                "INSERT INTO conversation_state (user_id, state, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO NOTHING",
                params![user, new.encode()?, now],
            ),
            (false, false) => conn.execute(
                "UPDATE conversation_state SET state = ?3, updated_at = ?4
                 WHERE user_id = ?1 AND state = ?2",
                params![user, expected.encode()?, new.encode()?, now],
            ),
            (false, true) => conn.execute(
                "DELETE FROM conversation_state WHERE user_id = ?1 AND state = ?2",
                params![user, expected.encode()?],
            ),
        }
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(changed == 1)
    }

    async fn remove(&self, user: &str) -> Result<()> {
        let conn = conn(&self.pool)?;
        conn.execute("DELETE FROM conversation_state WHERE user_id = ?1", [user])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn reap_idle(&self, max_idle: Duration) -> Result<usize> {
        let conn = conn(&self.pool)?;
        let idle_ms = i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis().saturating_sub(idle_ms);

        let removed = conn
            .execute(
                "DELETE FROM conversation_state WHERE updated_at <= ?1",
                [cutoff],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(removed)
    }
}

//! Replies remembered per provider message id
//!
//! Providers retry a webhook when the first response is slow. A retry of a
//! message that was already handled gets the original reply back instead of
//! driving the state machine a second time.

use std::time::Duration;

use mini_moka::sync::Cache;

use crate::conversation::Reply;

/// Default replay window (10 minutes)
const REPLAY_TTL_SECS: u64 = 600;

/// Maximum remembered replies
const REPLAY_MAX_ENTRIES: u64 = 2000;

/// TTL cache of replies keyed by provider message id
#[derive(Clone)]
pub struct ReplyCache {
    replies: Cache<String, Reply>,
}

impl Default for ReplyCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(REPLAY_TTL_SECS))
    }
}

impl ReplyCache {
    /// Create a cache that forgets replies after `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            replies: Cache::builder()
                .max_capacity(REPLAY_MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Reply previously sent for this message, if still remembered
    #[must_use]
    pub fn get(&self, message_id: &str) -> Option<Reply> {
        if message_id.is_empty() {
            return None;
        }
        self.replies.get(&message_id.to_string())
    }

    /// Remember the reply sent for a message
    pub fn insert(&self, message_id: &str, reply: Reply) {
        if message_id.is_empty() {
            return;
        }
        self.replies.insert(message_id.to_string(), reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remembers_reply() {
        let cache = ReplyCache::default();
        assert!(cache.get("SM1").is_none());

        cache.insert("SM1", Reply::text("hello"));
        assert_eq!(cache.get("SM1"), Some(Reply::text("hello")));
        assert!(cache.get("SM2").is_none());
    }

    #[test]
    fn test_ignores_empty_message_id() {
        let cache = ReplyCache::default();
        cache.insert("", Reply::text("hello"));
        assert!(cache.get("").is_none());
    }
}

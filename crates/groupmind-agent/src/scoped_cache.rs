//! ScopedCache: an in-memory fallback reply target. When a user replies
//! to an unaddressed message, the handler looks here instead of the
//! persisted history (which only holds addressed turns' replies).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use groupmind_core::types::{ConversationKey, MediaDescriptor};

/// Cap per (chat, thread); oldest dropped first. Spec.md §3 calls this
/// advisory — implementations may drop earlier than the TTL to bound
/// memory, which the FIFO cap already does.
const MAX_ENTRIES_PER_KEY: usize = 5;

/// Entries older than this are treated as expired on read.
const TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct ScopedCacheEntry {
    pub ts: i64,
    pub message_id: i64,
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub excerpt: String,
    pub text: String,
    pub media: Vec<MediaDescriptor>,
}

pub struct ScopedCache {
    entries: Mutex<HashMap<ConversationKey, VecDeque<ScopedCacheEntry>>>,
}

impl ScopedCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&self, key: ConversationKey, entry: ScopedCacheEntry) {
        let mut entries = self.entries.lock().unwrap();
        let deque = entries.entry(key).or_default();
        deque.push_back(entry);
        while deque.len() > MAX_ENTRIES_PER_KEY {
            deque.pop_front();
        }
    }

    /// Look up the entry for `message_id` within `key`, if present and
    /// not expired relative to `now`.
    pub fn get(&self, key: ConversationKey, message_id: i64, now: i64) -> Option<ScopedCacheEntry> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&key)?
            .iter()
            .find(|e| e.message_id == message_id && now - e.ts <= TTL_SECS)
            .cloned()
    }

    /// Most recent non-expired entry for `key`, used as the fallback
    /// reply target when the replied-to message id isn't specified.
    pub fn most_recent(&self, key: ConversationKey, now: i64) -> Option<ScopedCacheEntry> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&key)?
            .iter()
            .rev()
            .find(|e| now - e.ts <= TTL_SECS)
            .cloned()
    }
}

impl Default for ScopedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupmind_core::types::ChatId;

    fn entry(ts: i64, message_id: i64, text: &str) -> ScopedCacheEntry {
        ScopedCacheEntry {
            ts,
            message_id,
            user_id: Some(1),
            name: Some("Ann".to_string()),
            username: Some("ann".to_string()),
            excerpt: text.to_string(),
            text: text.to_string(),
            media: vec![],
        }
    }

    #[test]
    fn caps_at_five_entries_per_key() {
        let cache = ScopedCache::new();
        let key = ConversationKey::new(ChatId(1), None);
        for i in 0..10 {
            cache.push(key, entry(1000 + i, i, &format!("msg {i}")));
        }
        assert!(cache.get(key, 0, 2000).is_none());
        assert!(cache.get(key, 9, 2000).is_some());
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = ScopedCache::new();
        let key = ConversationKey::new(ChatId(1), None);
        cache.push(key, entry(1000, 1, "hello"));
        assert!(cache.get(key, 1, 1000 + TTL_SECS + 1).is_none());
        assert!(cache.get(key, 1, 1000 + TTL_SECS - 1).is_some());
    }

    #[test]
    fn most_recent_returns_latest_entry() {
        let cache = ScopedCache::new();
        let key = ConversationKey::new(ChatId(1), None);
        cache.push(key, entry(1000, 1, "first"));
        cache.push(key, entry(1010, 2, "second"));
        let latest = cache.most_recent(key, 1020).unwrap();
        assert_eq!(latest.text, "second");
    }
}

use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use groupmind_core::error::{GroupmindError, Result};
use groupmind_core::types::{ChatId, ConversationKey, MediaDescriptor, Role, ThreadId, TurnMetadata};

use crate::types::{NewTurn, Turn};

/// Persists conversation turns and chat-level moderation state (bans,
/// repeat-notice suppression). Wraps the connection in a `Mutex` like the
/// rest of this crate's stores — `rusqlite::Connection` is `!Sync`.
pub struct ConversationStore {
    db: Mutex<Connection>,
}

impl ConversationStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Persist a turn. `UNIQUE(chat_id, message_id)` makes re-delivery of
    /// the same platform update a no-op rather than a duplicate row.
    pub fn add_turn(&self, turn: NewTurn) -> Result<Turn> {
        let db = self.db.lock().unwrap();
        let media_json = serde_json::to_string(&turn.media)?;
        let metadata_json = serde_json::to_string(&turn.metadata)?;
        let embedding_blob = turn.embedding.as_deref().map(encode_embedding);

        db.execute(
            "INSERT INTO messages
                (chat_id, thread_id, message_id, user_id, role, text, media,
                 metadata, embedding, ts, retention_days)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(chat_id, message_id) DO NOTHING",
            rusqlite::params![
                turn.chat_id,
                turn.thread_id,
                turn.message_id,
                turn.user_id,
                turn.role.to_string(),
                turn.text,
                media_json,
                metadata_json,
                embedding_blob,
                turn.ts,
                turn.retention_days,
            ],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "add_turn".to_string(),
            source: e,
        })?;

        let row = db
            .query_row(
                "SELECT id, chat_id, thread_id, message_id, user_id, role, text,
                        media, metadata, embedding, ts, retention_days
                 FROM messages WHERE chat_id = ?1 AND message_id = ?2",
                rusqlite::params![turn.chat_id, turn.message_id],
                row_to_turn,
            )
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "add_turn_reselect".to_string(),
                source: e,
            })?;
        Ok(row)
    }

    /// Look up a single turn by its natural key, used by the handler to
    /// check whether a reply target was a prior model turn.
    pub fn turn_by_message_id(&self, chat_id: ChatId, message_id: i64) -> Result<Option<Turn>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, chat_id, thread_id, message_id, user_id, role, text,
                    media, metadata, embedding, ts, retention_days
             FROM messages WHERE chat_id = ?1 AND message_id = ?2",
            rusqlite::params![chat_id.0, message_id],
            row_to_turn,
        )
        .optional()
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "turn_by_message_id".to_string(),
            source: e,
        })
    }

    /// Most recent `limit` turns for a conversation, oldest first.
    pub fn recent(&self, key: ConversationKey, limit: usize) -> Result<Vec<Turn>> {
        let db = self.db.lock().unwrap();
        let mut turns = query_turns_for_key(&db, key, limit)?;
        turns.reverse();
        Ok(turns)
    }

    /// Rank the conversation's turns by cosine similarity to `query_embedding`,
    /// returning the top `limit`. Turns without a stored embedding are skipped.
    pub fn semantic_search(
        &self,
        key: ConversationKey,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<Turn>> {
        let db = self.db.lock().unwrap();
        // Bounded per spec.md §4.2: scan at most the 100 most recent
        // turns that actually carry an embedding, not 100 recent turns
        // that may mostly lack one.
        const MAX_CANDIDATES: usize = 100;
        let all = query_embedded_turns_for_key(&db, key, MAX_CANDIDATES)?;

        let mut scored: Vec<(f32, Turn)> = all
            .into_iter()
            .filter_map(|t| {
                let score = cosine_similarity(query_embedding, t.embedding.as_deref()?);
                Some((score, t))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(limit).map(|(_, t)| t).collect())
    }

    pub fn is_banned(&self, chat_id: ChatId, user_id: groupmind_core::types::UserId) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let found: Option<i64> = db
            .query_row(
                "SELECT 1 FROM bans WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id.0, user_id.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "is_banned".to_string(),
                source: e,
            })?;
        Ok(found.is_some())
    }

    pub fn ban(&self, chat_id: ChatId, user_id: groupmind_core::types::UserId, now: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO bans (chat_id, user_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(chat_id, user_id) DO NOTHING",
            rusqlite::params![chat_id.0, user_id.0, now],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "ban".to_string(),
            source: e,
        })?;
        Ok(())
    }

    pub fn unban(&self, chat_id: ChatId, user_id: groupmind_core::types::UserId) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM bans WHERE chat_id = ?1 AND user_id = ?2",
            rusqlite::params![chat_id.0, user_id.0],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "unban".to_string(),
            source: e,
        })?;
        Ok(())
    }

    /// Whether a notice of `reason` has not been sent to this user in this
    /// chat within `cooldown_secs`. Records the send as a side effect when
    /// it returns `true`, so callers don't need a separate "mark sent" step.
    pub fn should_send_notice(
        &self,
        chat_id: ChatId,
        user_id: groupmind_core::types::UserId,
        reason: &str,
        cooldown_secs: i64,
        now: i64,
    ) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let last_sent: Option<i64> = db
            .query_row(
                "SELECT last_sent_at FROM notices WHERE chat_id = ?1 AND user_id = ?2 AND reason = ?3",
                rusqlite::params![chat_id.0, user_id.0, reason],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "should_send_notice".to_string(),
                source: e,
            })?;

        let should_send = match last_sent {
            Some(ts) => now - ts >= cooldown_secs,
            None => true,
        };

        if should_send {
            db.execute(
                "INSERT INTO notices (chat_id, user_id, reason, last_sent_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(chat_id, user_id, reason) DO UPDATE SET last_sent_at = excluded.last_sent_at",
                rusqlite::params![chat_id.0, user_id.0, reason, now],
            )
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "mark_notice_sent".to_string(),
                source: e,
            })?;
            debug!(chat_id = chat_id.0, user_id = user_id.0, reason, "notice sent");
        }

        Ok(should_send)
    }
}

fn query_turns_for_key(db: &Connection, key: ConversationKey, limit: usize) -> Result<Vec<Turn>> {
    let mut stmt = db
        .prepare(
            "SELECT id, chat_id, thread_id, message_id, user_id, role, text,
                    media, metadata, embedding, ts, retention_days
             FROM messages
             WHERE chat_id = ?1 AND thread_id IS ?2
             ORDER BY ts DESC
             LIMIT ?3",
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "query_turns_for_key".to_string(),
            source: e,
        })?;

    let thread_id = key.thread_id.map(|t| t.0);
    let limit = if limit == usize::MAX { i64::MAX } else { limit as i64 };
    let rows = stmt
        .query_map(
            rusqlite::params![key.chat_id.0, thread_id, limit],
            row_to_turn,
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "query_turns_for_key".to_string(),
            source: e,
        })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Same as `query_turns_for_key`, narrowed to rows with a non-null
/// embedding — the candidate pool `semantic_search` ranks over.
fn query_embedded_turns_for_key(db: &Connection, key: ConversationKey, limit: usize) -> Result<Vec<Turn>> {
    let mut stmt = db
        .prepare(
            "SELECT id, chat_id, thread_id, message_id, user_id, role, text,
                    media, metadata, embedding, ts, retention_days
             FROM messages
             WHERE chat_id = ?1 AND thread_id IS ?2 AND embedding IS NOT NULL
             ORDER BY ts DESC
             LIMIT ?3",
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "query_embedded_turns_for_key".to_string(),
            source: e,
        })?;

    let thread_id = key.thread_id.map(|t| t.0);
    let rows = stmt
        .query_map(
            rusqlite::params![key.chat_id.0, thread_id, limit as i64],
            row_to_turn,
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "query_embedded_turns_for_key".to_string(),
            source: e,
        })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<Turn> {
    let role_str: String = row.get(5)?;
    let media_json: String = row.get(7)?;
    let metadata_json: String = row.get(8)?;
    let embedding_blob: Option<Vec<u8>> = row.get(9)?;

    Ok(Turn {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        thread_id: row.get(2)?,
        message_id: row.get(3)?,
        user_id: row.get(4)?,
        role: role_str.parse().unwrap_or(Role::User),
        text: row.get(6)?,
        media: serde_json::from_str::<Vec<MediaDescriptor>>(&media_json).unwrap_or_default(),
        metadata: serde_json::from_str::<TurnMetadata>(&metadata_json).unwrap_or_default(),
        embedding: embedding_blob.as_deref().map(decode_embedding),
        ts: row.get(10)?,
        retention_days: row.get(11)?,
    })
}

fn encode_embedding(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity of two vectors. Zero on length mismatch or either
/// vector having zero magnitude, never a division error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupmind_core::types::UserId;

    fn new_turn(chat_id: i64, message_id: i64, text: &str, embedding: Option<Vec<f32>>) -> NewTurn {
        NewTurn {
            chat_id,
            thread_id: None,
            message_id,
            user_id: Some(1),
            role: Role::User,
            text: text.to_string(),
            media: vec![],
            metadata: TurnMetadata::default(),
            embedding,
            ts: message_id,
            retention_days: 30,
        }
    }

    #[test]
    fn add_turn_is_idempotent_on_redelivery() {
        let conn = crate::db::open(":memory:").unwrap();
        let store = ConversationStore::new(conn);
        store.add_turn(new_turn(1, 100, "hello", None)).unwrap();
        store.add_turn(new_turn(1, 100, "hello again", None)).unwrap();

        let turns = store
            .recent(ConversationKey::new(ChatId(1), None), 10)
            .unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "hello");
    }

    #[test]
    fn recent_returns_oldest_first() {
        let conn = crate::db::open(":memory:").unwrap();
        let store = ConversationStore::new(conn);
        store.add_turn(new_turn(1, 1, "first", None)).unwrap();
        store.add_turn(new_turn(1, 2, "second", None)).unwrap();
        store.add_turn(new_turn(1, 3, "third", None)).unwrap();

        let turns = store
            .recent(ConversationKey::new(ChatId(1), None), 10)
            .unwrap();
        assert_eq!(
            turns.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn semantic_search_ranks_by_similarity() {
        let conn = crate::db::open(":memory:").unwrap();
        let store = ConversationStore::new(conn);
        store
            .add_turn(new_turn(1, 1, "about cats", Some(vec![1.0, 0.0])))
            .unwrap();
        store
            .add_turn(new_turn(1, 2, "about dogs", Some(vec![0.0, 1.0])))
            .unwrap();

        let results = store
            .semantic_search(ConversationKey::new(ChatId(1), None), &[1.0, 0.0], 1)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "about cats");
    }

    #[test]
    fn turn_by_message_id_finds_existing_and_misses_cleanly() {
        let conn = crate::db::open(":memory:").unwrap();
        let store = ConversationStore::new(conn);
        store.add_turn(new_turn(1, 5, "hello", None)).unwrap();

        let found = store.turn_by_message_id(ChatId(1), 5).unwrap().unwrap();
        assert_eq!(found.text, "hello");
        assert!(store.turn_by_message_id(ChatId(1), 999).unwrap().is_none());
    }

    #[test]
    fn ban_unban_roundtrip() {
        let conn = crate::db::open(":memory:").unwrap();
        let store = ConversationStore::new(conn);
        let chat = ChatId(1);
        let user = UserId(42);

        assert!(!store.is_banned(chat, user).unwrap());
        store.ban(chat, user, 1000).unwrap();
        assert!(store.is_banned(chat, user).unwrap());
        store.unban(chat, user).unwrap();
        assert!(!store.is_banned(chat, user).unwrap());
    }

    #[test]
    fn should_send_notice_respects_cooldown() {
        let conn = crate::db::open(":memory:").unwrap();
        let store = ConversationStore::new(conn);
        let chat = ChatId(1);
        let user = UserId(42);

        assert!(store.should_send_notice(chat, user, "throttled", 60, 1000).unwrap());
        assert!(!store.should_send_notice(chat, user, "throttled", 60, 1030).unwrap());
        assert!(store.should_send_notice(chat, user, "throttled", 60, 1065).unwrap());
    }

    #[test]
    fn cosine_similarity_handles_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}

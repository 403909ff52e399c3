use std::sync::Mutex;

use rusqlite::Connection;

use groupmind_core::error::{GroupmindError, Result};

use crate::types::UserMemory;

/// Cap on memory notes kept per (user, chat). Oldest is evicted FIFO when
/// a new note would exceed it.
const MAX_MEMORIES_PER_USER: i64 = 15;

pub struct MemoryRepo {
    db: Mutex<Connection>,
}

impl MemoryRepo {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Add a memory note, evicting the oldest note for this (user, chat)
    /// if the cap would otherwise be exceeded.
    pub fn add(&self, user_id: i64, chat_id: i64, memory_text: &str, now: i64) -> Result<UserMemory> {
        let db = self.db.lock().unwrap();

        db.execute(
            "INSERT INTO user_memories (user_id, chat_id, memory_text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(user_id, chat_id, memory_text)
             DO UPDATE SET updated_at = excluded.updated_at",
            rusqlite::params![user_id, chat_id, memory_text, now],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "add_memory".to_string(),
            source: e,
        })?;

        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM user_memories WHERE user_id = ?1 AND chat_id = ?2",
                rusqlite::params![user_id, chat_id],
                |row| row.get(0),
            )
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "count_memories".to_string(),
                source: e,
            })?;

        if count > MAX_MEMORIES_PER_USER {
            db.execute(
                "DELETE FROM user_memories WHERE id IN (
                    SELECT id FROM user_memories
                    WHERE user_id = ?1 AND chat_id = ?2
                    ORDER BY created_at ASC
                    LIMIT ?3
                )",
                rusqlite::params![user_id, chat_id, count - MAX_MEMORIES_PER_USER],
            )
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "evict_memories".to_string(),
                source: e,
            })?;
        }

        db.query_row(
            "SELECT id, user_id, chat_id, memory_text, created_at, updated_at
             FROM user_memories
             WHERE user_id = ?1 AND chat_id = ?2 AND memory_text = ?3",
            rusqlite::params![user_id, chat_id, memory_text],
            row_to_memory,
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "add_memory_reselect".to_string(),
            source: e,
        })
    }

    /// All memory notes for a (user, chat), oldest first.
    pub fn list(&self, user_id: i64, chat_id: i64) -> Result<Vec<UserMemory>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, chat_id, memory_text, created_at, updated_at
                 FROM user_memories
                 WHERE user_id = ?1 AND chat_id = ?2
                 ORDER BY created_at ASC",
            )
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "list_memories".to_string(),
                source: e,
            })?;
        let rows = stmt
            .query_map(rusqlite::params![user_id, chat_id], row_to_memory)
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "list_memories".to_string(),
                source: e,
            })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn forget(&self, memory_id: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM user_memories WHERE id = ?1",
            rusqlite::params![memory_id],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "forget_memory".to_string(),
            source: e,
        })?;
        Ok(())
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserMemory> {
    Ok(UserMemory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        chat_id: row.get(2)?,
        memory_text: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_evicts_oldest_past_the_cap() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = MemoryRepo::new(conn);
        for i in 0..20 {
            repo.add(1, 1, &format!("note {i}"), 1000 + i).unwrap();
        }
        let notes = repo.list(1, 1).unwrap();
        assert_eq!(notes.len(), MAX_MEMORIES_PER_USER as usize);
        assert_eq!(notes[0].memory_text, "note 5");
        assert_eq!(notes.last().unwrap().memory_text, "note 19");
    }

    #[test]
    fn forget_removes_a_single_note() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = MemoryRepo::new(conn);
        let note = repo.add(1, 1, "vegetarian", 1000).unwrap();
        repo.forget(note.id).unwrap();
        assert!(repo.list(1, 1).unwrap().is_empty());
    }
}

use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};

use groupmind_core::error::{GroupmindError, Result};

use crate::types::UserProfile;

pub struct ProfileRepo {
    db: Mutex<Connection>,
}

impl ProfileRepo {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Create the profile on first sight, or refresh display fields and
    /// `last_seen` on every subsequent turn.
    pub fn upsert_seen(
        &self,
        user_id: i64,
        chat_id: i64,
        first_name: Option<&str>,
        last_name: Option<&str>,
        username: Option<&str>,
        now: i64,
    ) -> Result<UserProfile> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO user_profiles
                (user_id, chat_id, first_name, last_name, username,
                 first_seen, last_seen, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6, ?6)
             ON CONFLICT(user_id, chat_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                username = excluded.username,
                last_seen = excluded.last_seen,
                updated_at = excluded.updated_at",
            rusqlite::params![user_id, chat_id, first_name, last_name, username, now],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "upsert_seen".to_string(),
            source: e,
        })?;

        db.query_row(
            "SELECT user_id, chat_id, first_name, last_name, username,
                    first_seen, last_seen, created_at, updated_at
             FROM user_profiles WHERE user_id = ?1 AND chat_id = ?2",
            rusqlite::params![user_id, chat_id],
            row_to_profile,
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "upsert_seen_reselect".to_string(),
            source: e,
        })
    }

    pub fn get(&self, user_id: i64, chat_id: i64) -> Result<Option<UserProfile>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT user_id, chat_id, first_name, last_name, username,
                    first_seen, last_seen, created_at, updated_at
             FROM user_profiles WHERE user_id = ?1 AND chat_id = ?2",
            rusqlite::params![user_id, chat_id],
            row_to_profile,
        )
        .optional()
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "get_profile".to_string(),
            source: e,
        })
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        chat_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        username: row.get(4)?,
        first_seen: row.get(5)?,
        last_seen: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seen_is_stable_across_upserts() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = ProfileRepo::new(conn);
        repo.upsert_seen(1, 1, Some("Ann"), None, Some("ann"), 1000)
            .unwrap();
        let updated = repo
            .upsert_seen(1, 1, Some("Anna"), None, Some("anna"), 2000)
            .unwrap();

        assert_eq!(updated.first_seen, 1000);
        assert_eq!(updated.last_seen, 2000);
        assert_eq!(updated.first_name.as_deref(), Some("Anna"));
    }

    #[test]
    fn get_returns_none_for_unknown_user() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = ProfileRepo::new(conn);
        assert!(repo.get(99, 1).unwrap().is_none());
    }
}

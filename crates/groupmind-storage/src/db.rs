use std::path::Path;

use rusqlite::Connection;

use groupmind_core::error::{GroupmindError, Result};

use crate::migrator::Migrator;

/// Built-in migration SQL, embedded so the crate works without a
/// filesystem-resident `migrations/` directory at runtime.
const EMBEDDED_MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "initial_schema",
    include_str!("../migrations/001_initial_schema.sql"),
)];

/// Open (creating if absent) the SQLite database at `path` and bring its
/// schema up to date. `path` of `:memory:` opens a private in-memory
/// database, primarily for tests.
pub fn open(path: &str) -> Result<Connection> {
    let conn = if path == ":memory:" {
        Connection::open_in_memory()
    } else {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        Connection::open(path)
    }
    .map_err(|e| GroupmindError::PersistentStore {
        operation: "open".to_string(),
        source: e,
    })?;

    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "pragma".to_string(),
            source: e,
        })?;

    apply_embedded_migrations(&conn)?;
    Ok(conn)
}

fn apply_embedded_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )",
    )
    .map_err(|e| GroupmindError::PersistentStore {
        operation: "ensure_migrations_table".to_string(),
        source: e,
    })?;

    for (version, name, sql) in EMBEDDED_MIGRATIONS {
        let already: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM schema_migrations WHERE version = ?1",
                rusqlite::params![version],
                |row| row.get(0),
            )
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "check_migration".to_string(),
                source: e,
            })?;
        if already > 0 {
            continue;
        }
        conn.execute_batch(sql)
            .map_err(|e| GroupmindError::PersistentStore {
                operation: format!("apply_embedded_migration({version})"),
                source: e,
            })?;
        conn.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![version, name, chrono::Utc::now().timestamp()],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "record_embedded_migration".to_string(),
            source: e,
        })?;
    }
    Ok(())
}

/// Apply any further migrations discovered in an external directory, for
/// deployments that ship additional `.sql` files alongside the binary.
pub fn migrate_from_dir(conn: &Connection, migrations_dir: &str) -> Result<i64> {
    Migrator::new(migrations_dir).migrate(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_schema() {
        let conn = open(":memory:").unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='messages'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn open_is_idempotent() {
        let conn = open(":memory:").unwrap();
        // Re-applying embedded migrations against the same connection must
        // not fail even though the tables already exist.
        apply_embedded_migrations(&conn).unwrap();
    }
}

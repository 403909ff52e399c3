//! Forward-only, version-tracked schema migrator.
//!
//! Discovers `<NNN>_<name>.sql` files in a directory, applies the ones not
//! yet recorded in `schema_migrations`, each inside its own transaction.
//! Rollback only forgets tracking rows — it never attempts to undo DDL.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::{info, warn};

use groupmind_core::error::{GroupmindError, Result};

/// A single discovered migration script.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
}

pub struct Migrator {
    migrations_dir: PathBuf,
}

impl Migrator {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Apply all pending migrations. Returns the resulting schema version.
    pub fn migrate(&self, conn: &Connection) -> Result<i64> {
        self.ensure_migrations_table(conn)?;

        let applied = self.applied_versions(conn)?;
        let discovered = self.discover_migrations()?;

        for migration in &discovered {
            if applied.contains(&migration.version) {
                continue;
            }
            self.apply_migration(conn, migration)?;
            info!(version = migration.version, name = %migration.name, "applied migration");
        }

        self.current_version(conn)
    }

    /// Returns `max(version)` of applied migrations, or 0 if none.
    pub fn current_version(&self, conn: &Connection) -> Result<i64> {
        let version: Option<i64> = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "current_version".to_string(),
                source: e,
            })?;
        Ok(version.unwrap_or(0))
    }

    /// Remove tracking rows for versions greater than `target`. Destructive
    /// and advisory only — does not attempt to reverse the DDL those
    /// migrations applied.
    pub fn rollback(&self, conn: &Connection, target: i64) -> Result<i64> {
        conn.execute(
            "DELETE FROM schema_migrations WHERE version > ?1",
            rusqlite::params![target],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "rollback".to_string(),
            source: e,
        })?;
        self.current_version(conn)
    }

    fn ensure_migrations_table(&self, conn: &Connection) -> Result<()> {
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
        })
    }

    fn applied_versions(&self, conn: &Connection) -> Result<BTreeSet<i64>> {
        let mut stmt = conn
            .prepare("SELECT version FROM schema_migrations")
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "applied_versions".to_string(),
                source: e,
            })?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "applied_versions".to_string(),
                source: e,
            })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn apply_migration(&self, conn: &Connection, migration: &Migration) -> Result<()> {
        conn.execute_batch(&migration.sql)
            .map_err(|e| GroupmindError::PersistentStore {
                operation: format!("apply_migration({})", migration.version),
                source: e,
            })?;
        conn.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                migration.version,
                migration.name,
                chrono::Utc::now().timestamp()
            ],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "record_migration".to_string(),
            source: e,
        })?;
        Ok(())
    }

    fn discover_migrations(&self) -> Result<Vec<Migration>> {
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&self.migrations_dir) {
            Ok(e) => e,
            Err(e) => {
                return Err(GroupmindError::Io(e));
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            match parse_migration_filename(&path) {
                Some((version, name)) => {
                    let sql = std::fs::read_to_string(&path)?;
                    out.push(Migration { version, name, sql });
                }
                None => {
                    warn!(path = %path.display(), "skipping malformed migration filename");
                }
            }
        }

        out.sort_by_key(|m| m.version);
        Ok(out)
    }
}

fn parse_migration_filename(path: &Path) -> Option<(i64, String)> {
    let stem = path.file_stem()?.to_str()?;
    let (version_str, name) = stem.split_once('_')?;
    let version: i64 = version_str.parse().ok()?;
    Some((version, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_migration(dir: &Path, filename: &str, sql: &str) {
        fs::write(dir.join(filename), sql).unwrap();
    }

    #[test]
    fn migrate_applies_in_order_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_migration(
            dir.path(),
            "001_create_widgets.sql",
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY);",
        );
        write_migration(
            dir.path(),
            "002_add_name.sql",
            "ALTER TABLE widgets ADD COLUMN name TEXT;",
        );

        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(dir.path());

        let v1 = migrator.migrate(&conn).unwrap();
        assert_eq!(v1, 2);

        // Re-running must not re-apply (ALTER TABLE twice would error).
        let v2 = migrator.migrate(&conn).unwrap();
        assert_eq!(v2, 2);
    }

    #[test]
    fn malformed_filename_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_migration(dir.path(), "not_a_version.sql", "SELECT 1;");
        write_migration(
            dir.path(),
            "001_ok.sql",
            "CREATE TABLE ok (id INTEGER PRIMARY KEY);",
        );

        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(dir.path());
        let version = migrator.migrate(&conn).unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn rollback_only_removes_tracking_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_migration(
            dir.path(),
            "001_create_widgets.sql",
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY);",
        );
        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(dir.path());
        migrator.migrate(&conn).unwrap();

        let version = migrator.rollback(&conn, 0).unwrap();
        assert_eq!(version, 0);

        // The table itself is still present — rollback is advisory only.
        let exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='widgets'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(exists, 1);
    }

    #[test]
    fn current_version_is_zero_with_no_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(dir.path());
        migrator.ensure_migrations_table(&conn).unwrap();
        assert_eq!(migrator.current_version(&conn).unwrap(), 0);
    }
}

use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};

use groupmind_core::error::{GroupmindError, Result};

use crate::types::ThrottleMetrics;

pub struct ThrottleRepo {
    db: Mutex<Connection>,
}

impl ThrottleRepo {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Record one request attempt for the 7-day rolling window the
    /// adaptive throttle manager reconstructs its burst/spacing stats from.
    pub fn log_request(&self, user_id: i64, was_throttled: bool, now: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO user_request_history (user_id, requested_at, was_throttled)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, now, was_throttled as i64],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "log_request".to_string(),
            source: e,
        })?;
        Ok(())
    }

    /// Request timestamps for a user within `[since, now]`, ascending.
    pub fn request_history_since(&self, user_id: i64, since: i64) -> Result<Vec<(i64, bool)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT requested_at, was_throttled FROM user_request_history
                 WHERE user_id = ?1 AND requested_at >= ?2
                 ORDER BY requested_at ASC",
            )
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "request_history_since".to_string(),
                source: e,
            })?;
        let rows = stmt
            .query_map(rusqlite::params![user_id, since], |row| {
                let throttled: i64 = row.get(1)?;
                Ok((row.get::<_, i64>(0)?, throttled != 0))
            })
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "request_history_since".to_string(),
                source: e,
            })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Drop request history rows older than `before`. Called periodically
    /// to bound table growth beyond the 7-day window anyone still reads.
    pub fn prune_history(&self, before: i64) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n = db
            .execute(
                "DELETE FROM user_request_history WHERE requested_at < ?1",
                rusqlite::params![before],
            )
            .map_err(|e| GroupmindError::PersistentStore {
                operation: "prune_history".to_string(),
                source: e,
            })?;
        Ok(n)
    }

    pub fn load_metrics(&self, user_id: i64) -> Result<Option<ThrottleMetrics>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT user_id, throttle_multiplier, spam_score, total_requests,
                    throttled_requests, burst_requests, avg_request_spacing_seconds,
                    last_reputation_update, created_at, updated_at
             FROM user_throttle_metrics WHERE user_id = ?1",
            rusqlite::params![user_id],
            row_to_metrics,
        )
        .optional()
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "load_metrics".to_string(),
            source: e,
        })
    }

    pub fn save_metrics(&self, metrics: &ThrottleMetrics) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO user_throttle_metrics
                (user_id, throttle_multiplier, spam_score, total_requests,
                 throttled_requests, burst_requests, avg_request_spacing_seconds,
                 last_reputation_update, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(user_id) DO UPDATE SET
                throttle_multiplier = excluded.throttle_multiplier,
                spam_score = excluded.spam_score,
                total_requests = excluded.total_requests,
                throttled_requests = excluded.throttled_requests,
                burst_requests = excluded.burst_requests,
                avg_request_spacing_seconds = excluded.avg_request_spacing_seconds,
                last_reputation_update = excluded.last_reputation_update,
                updated_at = excluded.updated_at",
            rusqlite::params![
                metrics.user_id,
                metrics.throttle_multiplier,
                metrics.spam_score,
                metrics.total_requests,
                metrics.throttled_requests,
                metrics.burst_requests,
                metrics.avg_request_spacing_seconds,
                metrics.last_reputation_update,
                metrics.created_at,
                metrics.updated_at,
            ],
        )
        .map_err(|e| GroupmindError::PersistentStore {
            operation: "save_metrics".to_string(),
            source: e,
        })?;
        Ok(())
    }
}

fn row_to_metrics(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThrottleMetrics> {
    Ok(ThrottleMetrics {
        user_id: row.get(0)?,
        throttle_multiplier: row.get(1)?,
        spam_score: row.get(2)?,
        total_requests: row.get(3)?,
        throttled_requests: row.get(4)?,
        burst_requests: row.get(5)?,
        avg_request_spacing_seconds: row.get(6)?,
        last_reputation_update: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_metrics_returns_none_when_absent() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = ThrottleRepo::new(conn);
        assert!(repo.load_metrics(1).unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = ThrottleRepo::new(conn);
        let metrics = ThrottleMetrics::fresh(7, 1000);
        repo.save_metrics(&metrics).unwrap();
        let loaded = repo.load_metrics(7).unwrap().unwrap();
        assert_eq!(loaded.user_id, 7);
        assert_eq!(loaded.throttle_multiplier, 1.0);
    }

    #[test]
    fn request_history_since_filters_and_orders() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = ThrottleRepo::new(conn);
        repo.log_request(1, false, 100).unwrap();
        repo.log_request(1, true, 200).unwrap();
        repo.log_request(1, false, 50).unwrap();

        let history = repo.request_history_since(1, 100).unwrap();
        assert_eq!(history, vec![(100, false), (200, true)]);
    }

    #[test]
    fn prune_history_removes_old_rows_only() {
        let conn = crate::db::open(":memory:").unwrap();
        let repo = ThrottleRepo::new(conn);
        repo.log_request(1, false, 100).unwrap();
        repo.log_request(1, false, 900).unwrap();
        let pruned = repo.prune_history(500).unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(repo.request_history_since(1, 0).unwrap().len(), 1);
    }
}

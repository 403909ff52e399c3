//! `AdaptiveThrottleManager` — derives a per-user reputation multiplier
//! from recent request history and gates requests against a base quota
//! scaled by that multiplier.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use groupmind_core::error::Result;
use groupmind_storage::throttle_repo::ThrottleRepo;
use groupmind_storage::types::ThrottleMetrics;

use crate::reputation::{
    compute_reputation, REPUTATION_REFRESH_INTERVAL_SECS, REPUTATION_WINDOW_SECS,
};

/// Width of the in-memory rolling quota window, in seconds (1 hour, to
/// match `base_limit_per_hour`).
const QUOTA_WINDOW_SECS: i64 = 3600;

pub struct ThrottleManager {
    repo: Arc<ThrottleRepo>,
    /// In-memory rolling request timestamps per user, backing the hourly
    /// quota gate. Persisted history (`ThrottleRepo::log_request`) is the
    /// durable source of truth for reputation; this is just a fast window.
    windows: DashMap<i64, VecDeque<i64>>,
    /// Per-user lock serializing the 24h stale-while-revalidate recompute.
    refresh_locks: DashMap<i64, Arc<tokio::sync::Mutex<()>>>,
}

impl ThrottleManager {
    pub fn new(repo: Arc<ThrottleRepo>) -> Arc<Self> {
        Arc::new(Self {
            repo,
            windows: DashMap::new(),
            refresh_locks: DashMap::new(),
        })
    }

    /// Returns 1.0 for a user with no stored metrics. Otherwise returns the
    /// stored multiplier, possibly scheduling a background refresh if it's
    /// stale (stale-while-revalidate: this call never blocks on the
    /// recompute).
    pub fn get_throttle_multiplier(self: &Arc<Self>, user_id: i64, now: i64) -> f64 {
        match self.repo.load_metrics(user_id) {
            Ok(Some(metrics)) => {
                if now - metrics.last_reputation_update >= REPUTATION_REFRESH_INTERVAL_SECS {
                    self.schedule_background_refresh(user_id, now);
                }
                metrics.throttle_multiplier
            }
            Ok(None) => 1.0,
            Err(e) => {
                warn!(error = %e, user_id, "failed to load throttle metrics, defaulting multiplier to 1.0");
                1.0
            }
        }
    }

    /// Recompute and persist reputation for `user_id` from the 7-day
    /// request history window. Synchronous — callers on the hot path
    /// should prefer `schedule_background_refresh`.
    pub fn update_user_reputation(&self, user_id: i64, now: i64) -> Result<ThrottleMetrics> {
        let since = now - REPUTATION_WINDOW_SECS;
        let history = self.repo.request_history_since(user_id, since)?;
        let stats = compute_reputation(&history);

        let existing = self.repo.load_metrics(user_id)?;
        let created_at = existing.map(|m| m.created_at).unwrap_or(now);

        let metrics = ThrottleMetrics {
            user_id,
            throttle_multiplier: stats.multiplier,
            spam_score: stats.spam_score,
            total_requests: history.len() as i64,
            throttled_requests: history.iter().filter(|(_, throttled)| *throttled).count() as i64,
            burst_requests: stats.burst_count as i64,
            avg_request_spacing_seconds: stats.avg_spacing_secs,
            last_reputation_update: now,
            created_at,
            updated_at: now,
        };
        self.repo.save_metrics(&metrics)?;
        debug!(user_id, multiplier = metrics.throttle_multiplier, "reputation refreshed");
        Ok(metrics)
    }

    /// Spawn a background recompute, serialized per-user so concurrent
    /// callers don't race the same recompute region.
    fn schedule_background_refresh(self: &Arc<Self>, user_id: i64, now: i64) {
        let lock = self
            .refresh_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = lock.lock().await;
            if let Err(e) = manager.update_user_reputation(user_id, now) {
                warn!(error = %e, user_id, "background reputation refresh failed");
            }
        });
    }

    /// Record one request attempt, both durably (for future reputation
    /// recomputes) and in the in-memory rolling quota window.
    pub fn record_request(&self, user_id: i64, was_throttled: bool, now: i64) -> Result<()> {
        self.repo.log_request(user_id, was_throttled, now)?;
        let mut window = self.windows.entry(user_id).or_default();
        window.push_back(now);
        prune_window(&mut window, now);
        Ok(())
    }

    /// Quota gate: `base_limit_per_hour * multiplier` requests per rolling
    /// hour. Admins bypass this at the caller level (spec.md §4.1 step 6);
    /// this method only implements the arithmetic.
    pub fn should_allow(self: &Arc<Self>, user_id: i64, base_limit_per_hour: u32, now: i64) -> bool {
        let multiplier = self.get_throttle_multiplier(user_id, now);
        let effective_limit = ((base_limit_per_hour as f64) * multiplier).round().max(1.0) as usize;

        let mut window = self.windows.entry(user_id).or_default();
        prune_window(&mut window, now);
        window.len() < effective_limit
    }
}

fn prune_window(window: &mut VecDeque<i64>, now: i64) {
    while window.front().is_some_and(|ts| now - ts > QUOTA_WINDOW_SECS) {
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupmind_storage::db;

    fn manager() -> Arc<ThrottleManager> {
        let conn = db::open(":memory:").unwrap();
        let repo = Arc::new(ThrottleRepo::new(conn));
        ThrottleManager::new(repo)
    }

    #[test]
    fn unknown_user_defaults_to_multiplier_one() {
        let m = manager();
        assert_eq!(m.get_throttle_multiplier(1, 1000), 1.0);
    }

    #[test]
    fn update_user_reputation_persists_and_is_retrievable() {
        let m = manager();
        for i in 0..10 {
            m.record_request(1, false, 1000 + i * 90).unwrap();
        }
        let metrics = m.update_user_reputation(1, 2000).unwrap();
        assert_eq!(metrics.throttle_multiplier, 1.5);
        assert_eq!(m.get_throttle_multiplier(1, 2000), 1.5);
    }

    #[tokio::test]
    async fn should_allow_gates_on_effective_quota() {
        let m = manager();
        // Default multiplier 1.0, base limit 3/hour.
        assert!(m.should_allow(1, 3, 1000));
        m.record_request(1, false, 1000).unwrap();
        assert!(m.should_allow(1, 3, 1010));
        m.record_request(1, false, 1010).unwrap();
        assert!(m.should_allow(1, 3, 1020));
        m.record_request(1, false, 1020).unwrap();
        // Fourth request within the same hour exceeds the limit of 3.
        assert!(!m.should_allow(1, 3, 1030));
    }

    #[tokio::test]
    async fn quota_window_prunes_requests_older_than_an_hour() {
        let m = manager();
        m.record_request(1, false, 1000).unwrap();
        m.record_request(1, false, 1000).unwrap();
        m.record_request(1, false, 1000).unwrap();
        assert!(!m.should_allow(1, 3, 1000));
        // An hour plus a second later the window has fully rolled over.
        assert!(m.should_allow(1, 3, 1000 + 3601));
    }
}

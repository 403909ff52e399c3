//! Pure reputation-scoring algorithm, independent of storage so the law
//! ("reputation monotonicity") and the concrete thresholds are unit
//! testable without a database.

/// 7-day rolling window used to reconstruct a user's request history.
pub const REPUTATION_WINDOW_SECS: i64 = 7 * 86_400;

/// A reputation recompute is skipped if the last one happened within this
/// many seconds — stale reads are served in the meantime.
pub const REPUTATION_REFRESH_INTERVAL_SECS: i64 = 86_400;

/// Sliding burst-window width and the request count that defines a burst.
const BURST_WINDOW_SECS: i64 = 60;
const BURST_THRESHOLD_REQUESTS: usize = 5;

/// Derived statistics over one user's request history in the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReputationStats {
    pub burst_count: u32,
    pub throttle_rate: f64,
    pub avg_spacing_secs: f64,
    pub spam_score: f64,
    pub reputation_score: f64,
    pub multiplier: f64,
}

/// Compute `burst_count`: number of 60-second sliding windows containing
/// at least `BURST_THRESHOLD_REQUESTS` requests. `timestamps` must be
/// sorted ascending.
fn count_burst_windows(timestamps: &[i64]) -> u32 {
    let mut count = 0u32;
    let mut left = 0usize;
    for right in 0..timestamps.len() {
        while timestamps[right] - timestamps[left] > BURST_WINDOW_SECS {
            left += 1;
        }
        if right - left + 1 >= BURST_THRESHOLD_REQUESTS {
            count += 1;
        }
    }
    count
}

fn avg_spacing(timestamps: &[i64]) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }
    let mut total = 0i64;
    for w in timestamps.windows(2) {
        total += w[1] - w[0];
    }
    total as f64 / (timestamps.len() - 1) as f64
}

fn spacing_score(avg_spacing_secs: f64) -> f64 {
    if (60.0..=120.0).contains(&avg_spacing_secs) {
        0.0
    } else if avg_spacing_secs < 30.0 {
        0.2
    } else if avg_spacing_secs > 300.0 {
        0.1
    } else {
        0.05
    }
}

/// Map a reputation score in `[0, 1]` to the discrete multiplier set
/// `{0.7, 0.85, 1.0, 1.25, 1.5}`.
pub fn reputation_to_multiplier(reputation_score: f64) -> f64 {
    if reputation_score >= 0.9 {
        1.5
    } else if reputation_score >= 0.7 {
        1.25
    } else if reputation_score >= 0.5 {
        1.0
    } else if reputation_score >= 0.3 {
        0.85
    } else {
        0.7
    }
}

/// Run `update_user_reputation`'s scoring algorithm (spec.md §4.3) over a
/// user's request history in the 7-day window. `history` is
/// `(timestamp, was_throttled)` pairs sorted ascending; empty input
/// yields the default (multiplier 1.0, spam_score 0).
pub fn compute_reputation(history: &[(i64, bool)]) -> ReputationStats {
    if history.is_empty() {
        return ReputationStats {
            burst_count: 0,
            throttle_rate: 0.0,
            avg_spacing_secs: 0.0,
            spam_score: 0.0,
            reputation_score: 1.0,
            multiplier: 1.0,
        };
    }

    let timestamps: Vec<i64> = history.iter().map(|(ts, _)| *ts).collect();
    let throttled = history.iter().filter(|(_, t)| *t).count();

    let burst_count = count_burst_windows(&timestamps);
    let throttle_rate = throttled as f64 / history.len() as f64;
    let avg_spacing_secs = avg_spacing(&timestamps);

    let burst_score = (burst_count as f64 / 10.0).min(0.4);
    let throttle_score = throttle_rate.min(0.4);
    let spacing_score = spacing_score(avg_spacing_secs);

    let spam_score = (burst_score + throttle_score + spacing_score).min(1.0);
    let reputation_score = 1.0 - spam_score;
    let multiplier = reputation_to_multiplier(reputation_score);

    ReputationStats {
        burst_count,
        throttle_rate,
        avg_spacing_secs,
        spam_score,
        reputation_score,
        multiplier,
    }
}

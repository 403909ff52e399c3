//! In-process counters and gauges with labels.
//!
//! Deliberately not a global singleton: construct one `Telemetry` per
//! process and pass `Arc<Telemetry>` into whatever needs to record a metric.
//! A test can hand each case its own instance instead of sharing mutable
//! global state.

use std::collections::BTreeMap;

use dashmap::DashMap;
use tracing::debug;

/// A metric identity: its name plus a sorted set of label pairs.
type MetricKey = (String, Vec<(String, String)>);

fn normalize_labels(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut v: Vec<(String, String)> = labels
        .iter()
        .map(|(k, val)| (k.to_string(), val.to_string()))
        .collect();
    v.sort();
    v
}

fn render_key(name: &str, labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered = labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{name}{{{rendered}}}")
}

/// Concurrent, lock-free counters and gauges with label dimensions.
pub struct Telemetry {
    metrics: DashMap<MetricKey, i64>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
        }
    }

    /// Increment a counter by `amount` (default 1 via `increment`).
    pub fn increment_counter_by(&self, name: &str, amount: i64, labels: &[(&str, &str)]) {
        let key = (name.to_string(), normalize_labels(labels));
        let mut entry = self.metrics.entry(key).or_insert(0);
        *entry += amount;
        let value = *entry;
        debug!(metric = name, value, "metric_increment");
    }

    pub fn increment_counter(&self, name: &str) {
        self.increment_counter_by(name, 1, &[]);
    }

    pub fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, 1, labels);
    }

    /// Overwrite a gauge value.
    pub fn set_gauge(&self, name: &str, value: i64, labels: &[(&str, &str)]) {
        let key = (name.to_string(), normalize_labels(labels));
        self.metrics.insert(key, value);
        debug!(metric = name, value, "metric_set");
    }

    /// Snapshot all counters/gauges for diagnostics or tests. Keys that carry
    /// labels are rendered as `name{k=v,...}`.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.metrics
            .iter()
            .map(|e| {
                let (name, labels) = e.key();
                (render_key(name, labels), *e.value())
            })
            .collect()
    }

    /// Clear all recorded metrics. Primarily for tests.
    pub fn reset(&self) {
        self.metrics.clear();
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_accumulates() {
        let t = Telemetry::new();
        t.increment_counter("chat.incoming");
        t.increment_counter("chat.incoming");
        t.increment_counter("chat.incoming");
        let snap = t.snapshot();
        assert_eq!(snap.get("chat.incoming"), Some(&3));
    }

    #[test]
    fn labels_distinguish_series() {
        let t = Telemetry::new();
        t.increment("fact_extraction.method", &[("method", "rule_based")]);
        t.increment("fact_extraction.method", &[("method", "model_based")]);
        t.increment("fact_extraction.method", &[("method", "rule_based")]);
        let snap = t.snapshot();
        assert_eq!(
            snap.get("fact_extraction.method{method=rule_based}"),
            Some(&2)
        );
        assert_eq!(
            snap.get("fact_extraction.method{method=model_based}"),
            Some(&1)
        );
    }

    #[test]
    fn gauge_overwrites() {
        let t = Telemetry::new();
        t.set_gauge("resource.optimization_level", 0, &[]);
        t.set_gauge("resource.optimization_level", 2, &[]);
        assert_eq!(t.snapshot().get("resource.optimization_level"), Some(&2));
    }

    #[test]
    fn reset_clears_all() {
        let t = Telemetry::new();
        t.increment_counter("x");
        t.reset();
        assert!(t.snapshot().is_empty());
    }
}

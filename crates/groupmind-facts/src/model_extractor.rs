use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{FactCandidate, FactType};

/// One fact as returned by a model-based extractor's raw JSON output,
/// before validation. Fields are deliberately loose (`String` for
/// `fact_type`) because the model can emit anything — validation is the
/// hybrid orchestrator's job, not the deserializer's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawModelFact {
    pub fact_type: String,
    pub fact_key: String,
    pub fact_value: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence_text: Option<String>,
}

/// Fallback extractor, invoked only when the rule-based pass falls short.
/// Implemented by whatever calls the generative model — this crate only
/// needs the trait so the hybrid orchestrator is fully testable without a
/// live upstream dependency.
#[async_trait]
pub trait ModelFactExtractor: Send + Sync {
    async fn extract_raw(&self, text: &str) -> Result<Vec<RawModelFact>, String>;
}

/// Validate one raw model fact: `fact_type` must be a known enum member,
/// `confidence` must fall in `[min_confidence, 1]`, and both key/value must
/// be non-empty. Returns `None` for anything that fails validation —
/// invalid items are dropped, never defaulted.
pub fn validate(raw: RawModelFact, min_confidence: f64) -> Option<FactCandidate> {
    let fact_type: FactType = raw.fact_type.parse().ok()?;
    if raw.fact_key.trim().is_empty() || raw.fact_value.trim().is_empty() {
        return None;
    }
    if !(min_confidence..=1.0).contains(&raw.confidence) {
        return None;
    }
    Some(FactCandidate {
        fact_type,
        fact_key: raw.fact_key,
        fact_value: raw.fact_value,
        confidence: raw.confidence,
        evidence_text: raw.evidence_text.unwrap_or_default(),
    })
}

/// Validate a batch, dropping invalid items and keeping the rest.
pub fn validate_all(raws: Vec<RawModelFact>, min_confidence: f64) -> Vec<FactCandidate> {
    raws.into_iter()
        .filter_map(|r| validate(r, min_confidence))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(fact_type: &str, confidence: f64) -> RawModelFact {
        RawModelFact {
            fact_type: fact_type.to_string(),
            fact_key: "location".to_string(),
            fact_value: "berlin".to_string(),
            confidence,
            evidence_text: None,
        }
    }

    #[test]
    fn rejects_unknown_fact_type() {
        assert!(validate(raw("not_a_type", 0.9), 0.5).is_none());
    }

    #[test]
    fn rejects_confidence_below_minimum() {
        assert!(validate(raw("location", 0.3), 0.5).is_none());
    }

    #[test]
    fn accepts_valid_fact() {
        assert!(validate(raw("location", 0.7), 0.5).is_some());
    }

    #[test]
    fn validate_all_drops_only_invalid_items() {
        let raws = vec![raw("location", 0.9), raw("bogus", 0.9), raw("location", 0.1)];
        let valid = validate_all(raws, 0.5);
        assert_eq!(valid.len(), 1);
    }
}

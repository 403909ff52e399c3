//! Hybrid fact extraction: rule-based primary, model-based fallback on
//! shortfall, deduplicated by normalized key.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::extractor::{FactExtractor, RuleBasedExtractor};
use crate::model_extractor::{validate_all, ModelFactExtractor};
use crate::types::{ExtractionContext, FactCandidate};

/// Minimum message length (characters) before the model fallback is even
/// considered — short messages rarely carry enough signal to be worth an
/// upstream call.
const MODEL_FALLBACK_MIN_TEXT_LEN: usize = 30;

/// Rule-based result count below which the model fallback is invoked
/// (when configured and the text is long enough). Anything at or above
/// this (spec's "≥ 3 facts" sufficiency bound, since this is 2) finishes
/// the hybrid pass on rule-based results alone.
const SHORTFALL_RULE_FACT_COUNT: usize = 2;

pub struct HybridExtractor {
    rule_based: RuleBasedExtractor,
    model_based: Option<Arc<dyn ModelFactExtractor>>,
    min_confidence: f64,
}

impl HybridExtractor {
    pub fn new(model_based: Option<Arc<dyn ModelFactExtractor>>, min_confidence: f64) -> Self {
        Self {
            rule_based: RuleBasedExtractor::new(),
            model_based,
            min_confidence,
        }
    }

    /// Run the hybrid pipeline: rule-based always, model-based on
    /// shortfall, then dedup by `(fact_type, fact_key, normalized_value)`
    /// keeping the highest-confidence variant. `allow_model_fallback` is
    /// the caller's resource-pressure gate (spec.md §4.6: emergency
    /// pressure suppresses the model-based extractor) — pass `false` to
    /// force a rule-based-only pass regardless of the shortfall count.
    pub async fn extract(
        &self,
        text: &str,
        ctx: &ExtractionContext,
        allow_model_fallback: bool,
    ) -> Vec<FactCandidate> {
        let rule_facts = self
            .rule_based
            .extract(text, ctx, self.min_confidence)
            .await;

        let mut all_facts = rule_facts.clone();

        let should_try_model = allow_model_fallback
            && rule_facts.len() < SHORTFALL_RULE_FACT_COUNT
            && text.chars().count() > MODEL_FALLBACK_MIN_TEXT_LEN;

        if should_try_model {
            if let Some(model) = &self.model_based {
                match model.extract_raw(text).await {
                    Ok(raw) => {
                        let validated = validate_all(raw, self.min_confidence);
                        debug!(count = validated.len(), "model-based fallback produced facts");
                        all_facts.extend(validated);
                    }
                    Err(e) => {
                        warn!(error = %e, "model-based fact extraction failed, continuing with rule-based only");
                    }
                }
            }
        }

        dedup(all_facts)
    }
}

/// Deduplicate by `(fact_type, fact_key, normalized_value)`, keeping
/// whichever candidate has the highest confidence.
fn dedup(facts: Vec<FactCandidate>) -> Vec<FactCandidate> {
    let mut best: HashMap<(crate::types::FactType, String, String), FactCandidate> = HashMap::new();
    for fact in facts {
        let key = fact.dedup_key();
        match best.get(&key) {
            Some(existing) if existing.confidence >= fact.confidence => {}
            _ => {
                best.insert(key, fact);
            }
        }
    }
    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FactType;
    use async_trait::async_trait;

    struct StubModelExtractor {
        facts: Vec<crate::model_extractor::RawModelFact>,
    }

    #[async_trait]
    impl ModelFactExtractor for StubModelExtractor {
        async fn extract_raw(
            &self,
            _text: &str,
        ) -> Result<Vec<crate::model_extractor::RawModelFact>, String> {
            Ok(self.facts.clone())
        }
    }

    fn ctx() -> ExtractionContext {
        ExtractionContext {
            chat_id: 1,
            user_id: 1,
            source_message_id: Some(10),
        }
    }

    #[tokio::test]
    async fn skips_model_fallback_when_rules_found_enough() {
        let model = Arc::new(StubModelExtractor { facts: vec![] });
        let hybrid = HybridExtractor::new(Some(model), 0.5);
        // Three distinct rule hits in one message.
        let text = "I live in Berlin. I love coffee but I hate mornings.";
        let facts = hybrid.extract(text, &ctx(), true).await;
        assert!(facts.len() >= 3);
    }

    #[tokio::test]
    async fn invokes_model_fallback_on_shortfall_for_long_text() {
        let raw = crate::model_extractor::RawModelFact {
            fact_type: "profession".to_string(),
            fact_key: "profession".to_string(),
            fact_value: "teacher".to_string(),
            confidence: 0.8,
            evidence_text: None,
        };
        let model = Arc::new(StubModelExtractor { facts: vec![raw] });
        let hybrid = HybridExtractor::new(Some(model), 0.5);
        // Long text (>30 chars) with no rule-based hits.
        let text = "This is a perfectly ordinary sentence with no obvious facts in it at all.";
        let facts = hybrid.extract(text, &ctx(), true).await;
        assert!(facts.iter().any(|f| f.fact_type == FactType::Profession));
    }

    #[tokio::test]
    async fn skips_model_fallback_for_short_text() {
        let raw = crate::model_extractor::RawModelFact {
            fact_type: "profession".to_string(),
            fact_key: "profession".to_string(),
            fact_value: "teacher".to_string(),
            confidence: 0.8,
            evidence_text: None,
        };
        let model = Arc::new(StubModelExtractor { facts: vec![raw] });
        let hybrid = HybridExtractor::new(Some(model), 0.5);
        let facts = hybrid.extract("short", &ctx(), true).await;
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn model_fallback_uses_char_count_not_byte_len() {
        // 16 Cyrillic characters: 32 bytes (over the old byte threshold)
        // but only 16 chars (under the 30-char one). The shortfall gate
        // must treat this as "not longer than 30 characters" and skip
        // the model fallback.
        let raw = crate::model_extractor::RawModelFact {
            fact_type: "profession".to_string(),
            fact_key: "profession".to_string(),
            fact_value: "teacher".to_string(),
            confidence: 0.8,
            evidence_text: None,
        };
        let model = Arc::new(StubModelExtractor { facts: vec![raw] });
        let hybrid = HybridExtractor::new(Some(model), 0.5);
        let text = "а".repeat(16);
        assert!(text.len() > 30);
        assert_eq!(text.chars().count(), 16);
        let facts = hybrid.extract(&text, &ctx(), true).await;
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn disabled_model_fallback_is_never_invoked() {
        let raw = crate::model_extractor::RawModelFact {
            fact_type: "profession".to_string(),
            fact_key: "profession".to_string(),
            fact_value: "teacher".to_string(),
            confidence: 0.8,
            evidence_text: None,
        };
        let model = Arc::new(StubModelExtractor { facts: vec![raw] });
        let hybrid = HybridExtractor::new(Some(model), 0.5);
        let text = "This is a perfectly ordinary sentence with no obvious facts in it at all.";
        let facts = hybrid.extract(text, &ctx(), false).await;
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn dedup_keeps_highest_confidence_variant() {
        let facts = vec![
            FactCandidate {
                fact_type: FactType::Location,
                fact_key: "location".to_string(),
                fact_value: "kyiv".to_string(),
                confidence: 0.7,
                evidence_text: String::new(),
            },
            FactCandidate {
                fact_type: FactType::Location,
                fact_key: "location".to_string(),
                fact_value: "Kyiv".to_string(),
                confidence: 0.95,
                evidence_text: String::new(),
            },
        ];
        let deduped = dedup(facts);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].confidence, 0.95);
    }
}

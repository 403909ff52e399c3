use async_trait::async_trait;

use crate::rules::{en, uk};
use crate::types::{ExtractionContext, FactCandidate};

/// Capability interface every fact extractor implements — rule-based,
/// model-based, or a test double. Mirrors spec.md §9's "Fact extractors as
/// plug-ins" redesign hint.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        ctx: &ExtractionContext,
        min_confidence: f64,
    ) -> Vec<FactCandidate>;
}

/// Primary extractor: always runs. Composes the English and Ukrainian rule
/// packs and filters by `min_confidence`.
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FactExtractor for RuleBasedExtractor {
    async fn extract(
        &self,
        text: &str,
        _ctx: &ExtractionContext,
        min_confidence: f64,
    ) -> Vec<FactCandidate> {
        let mut candidates = en::extract(text);
        candidates.extend(uk::extract(text));
        candidates.retain(|c| c.confidence >= min_confidence);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_based_extractor_combines_both_languages() {
        let extractor = RuleBasedExtractor::new();
        let ctx = ExtractionContext::default();
        let facts = extractor
            .extract("I live in Berlin. я з Києва.", &ctx, 0.0)
            .await;
        assert!(facts.len() >= 2);
    }

    #[tokio::test]
    async fn min_confidence_filters_low_confidence_candidates() {
        let extractor = RuleBasedExtractor::new();
        let ctx = ExtractionContext::default();
        let facts = extractor.extract("I'm 29", &ctx, 0.95).await;
        assert!(facts.is_empty(), "base confidence 0.9 should be filtered at 0.95");
    }
}

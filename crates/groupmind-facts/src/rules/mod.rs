pub mod en;
pub mod uk;

use crate::types::{FactCandidate, FactType};

/// One compiled rule: a regex plus the fact type/key/base-confidence it
/// emits when matched. `value_group` is the capture group index holding
/// the free-form value.
pub struct Rule {
    pub pattern: regex::Regex,
    pub fact_type: FactType,
    pub fact_key: &'static str,
    pub base_confidence: f64,
    pub value_group: usize,
}

/// Free-form fact values must fall in this length range to be accepted —
/// guards against regex matches that capture punctuation-only or
/// paragraph-length "values".
pub const MIN_VALUE_LEN: usize = 3;
pub const MAX_VALUE_LEN: usize = 100;

/// Plausible human age range for the age rule's numeric sanity bound.
pub const MIN_AGE: u32 = 10;
pub const MAX_AGE: u32 = 100;

/// Run every rule in `rules` against `text`, returning the emitted
/// candidates. Free-form categories are filtered to
/// `[MIN_VALUE_LEN, MAX_VALUE_LEN]`; age candidates are filtered to
/// `[MIN_AGE, MAX_AGE]` and given confidence 1.0 when in range.
pub fn apply_rules(text: &str, rules: &[Rule]) -> Vec<FactCandidate> {
    let mut out = Vec::new();
    for rule in rules {
        for caps in rule.pattern.captures_iter(text) {
            let Some(m) = caps.get(rule.value_group) else {
                continue;
            };
            let raw_value = m.as_str().trim();
            if raw_value.is_empty() {
                continue;
            }

            if rule.fact_type == FactType::Age {
                let Ok(age) = raw_value.parse::<u32>() else {
                    continue;
                };
                if !(MIN_AGE..=MAX_AGE).contains(&age) {
                    continue;
                }
                out.push(FactCandidate {
                    fact_type: FactType::Age,
                    fact_key: rule.fact_key.to_string(),
                    fact_value: age.to_string(),
                    confidence: 1.0,
                    evidence_text: caps.get(0).unwrap().as_str().to_string(),
                });
                continue;
            }

            if raw_value.len() < MIN_VALUE_LEN || raw_value.len() > MAX_VALUE_LEN {
                continue;
            }

            let mut confidence = rule.base_confidence;
            let boosted = match rule.fact_type {
                FactType::Location => crate::normalize::is_known_location(raw_value),
                FactType::Language => crate::normalize::is_known_language(raw_value),
                _ => false,
            };
            if boosted {
                confidence = (confidence + 0.05).min(1.0);
            }

            out.push(FactCandidate {
                fact_type: rule.fact_type,
                fact_key: rule.fact_key.to_string(),
                fact_value: raw_value.to_string(),
                confidence,
                evidence_text: caps.get(0).unwrap().as_str().to_string(),
            });
        }
    }
    out
}

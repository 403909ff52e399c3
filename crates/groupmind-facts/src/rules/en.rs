//! English rule-based fact extraction regexes.

use std::sync::OnceLock;

use regex::Regex;

use super::Rule;
use crate::types::{FactCandidate, FactType};

fn rules() -> &'static Vec<Rule> {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule {
                pattern: Regex::new(r"(?i)\bi(?:'m| am) from ([a-z][a-z\s]{1,40})").unwrap(),
                fact_type: FactType::Location,
                fact_key: "location",
                base_confidence: 0.85,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)\bi live in ([a-z][a-z\s]{1,40})").unwrap(),
                fact_type: FactType::Location,
                fact_key: "location",
                base_confidence: 0.9,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)\bi (?:really )?(?:like|love|enjoy) ([a-z][a-z\s]{1,40})")
                    .unwrap(),
                fact_type: FactType::Likes,
                fact_key: "likes",
                base_confidence: 0.85,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(
                    r"(?i)\bi (?:really )?(?:hate|dislike|can't stand) ([a-z][a-z\s]{1,40})",
                )
                .unwrap(),
                fact_type: FactType::Dislikes,
                fact_key: "dislikes",
                base_confidence: 0.85,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)\bi speak ([a-z][a-z\s]{1,40})").unwrap(),
                fact_type: FactType::Language,
                fact_key: "language",
                base_confidence: 0.9,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)\bi(?:'m| am) a(?:n)? ([a-z][a-z\s]{1,40})(?:\.|,|$)")
                    .unwrap(),
                fact_type: FactType::Profession,
                fact_key: "profession",
                base_confidence: 0.8,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(
                    r"(?i)\bi(?:'m| am) (?:a |an )?([a-z0-9+#.]+) (?:developer|programmer|dev)\b",
                )
                .unwrap(),
                fact_type: FactType::ProgrammingLanguage,
                fact_key: "programming_language",
                base_confidence: 0.85,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)\bi (?:code|program|write code) in ([a-z0-9+#]+)")
                    .unwrap(),
                fact_type: FactType::ProgrammingLanguage,
                fact_key: "programming_language",
                base_confidence: 0.9,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)\bi(?:'m| am) (\d{1,3}) years old\b").unwrap(),
                fact_type: FactType::Age,
                fact_key: "age",
                base_confidence: 1.0,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)\bi(?:'m| am) (\d{1,3})\b").unwrap(),
                fact_type: FactType::Age,
                fact_key: "age",
                base_confidence: 0.9,
                value_group: 1,
            },
        ]
    })
}

/// Run every English rule against `text`.
pub fn extract(text: &str) -> Vec<FactCandidate> {
    super::apply_rules(text, rules())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_location() {
        let facts = extract("I live in Berlin, it's great");
        assert!(facts
            .iter()
            .any(|f| f.fact_type == FactType::Location && f.fact_value.starts_with("berlin")));
    }

    #[test]
    fn extracts_likes_and_dislikes() {
        let facts = extract("I love coffee but I hate mornings");
        assert!(facts.iter().any(|f| f.fact_type == FactType::Likes));
        assert!(facts.iter().any(|f| f.fact_type == FactType::Dislikes));
    }

    #[test]
    fn extracts_programming_language() {
        let facts = extract("I code in rust every day");
        assert!(facts
            .iter()
            .any(|f| f.fact_type == FactType::ProgrammingLanguage && f.fact_value == "rust"));
    }

    #[test]
    fn extracts_age_within_bounds() {
        let facts = extract("I'm 29 years old");
        let age = facts.iter().find(|f| f.fact_type == FactType::Age).unwrap();
        assert_eq!(age.fact_value, "29");
        assert_eq!(age.confidence, 1.0);
    }

    #[test]
    fn rejects_implausible_age() {
        let facts = extract("I'm 900");
        assert!(!facts.iter().any(|f| f.fact_type == FactType::Age));
    }
}

//! Ukrainian (Cyrillic) rule-based fact extraction regexes.

use std::sync::OnceLock;

use regex::Regex;

use super::Rule;
use crate::types::{FactCandidate, FactType};

fn rules() -> &'static Vec<Rule> {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule {
                pattern: Regex::new(r"(?i)я (?:з|із) ([а-яіїєґ][а-яіїєґ\s]{1,40})").unwrap(),
                fact_type: FactType::Location,
                fact_key: "location",
                base_confidence: 0.85,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)я живу[^а-яіїєґ]+(?:в|у) ([а-яіїєґ][а-яіїєґ\s]{1,40})")
                    .unwrap(),
                fact_type: FactType::Location,
                fact_key: "location",
                base_confidence: 0.9,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(
                    r"(?i)мені подобається ([а-яіїєґ][а-яіїєґ\s]{1,40})",
                )
                .unwrap(),
                fact_type: FactType::Likes,
                fact_key: "likes",
                base_confidence: 0.85,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(
                    r"(?i)я (?:не люблю|ненавиджу) ([а-яіїєґ][а-яіїєґ\s]{1,40})",
                )
                .unwrap(),
                fact_type: FactType::Dislikes,
                fact_key: "dislikes",
                base_confidence: 0.85,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)я розмовляю ([а-яіїєґ][а-яіїєґ\s]{1,40})").unwrap(),
                fact_type: FactType::Language,
                fact_key: "language",
                base_confidence: 0.9,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)я (?:працюю|за професією) ([а-яіїєґ][а-яіїєґ\s]{1,40})")
                    .unwrap(),
                fact_type: FactType::Profession,
                fact_key: "profession",
                base_confidence: 0.8,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(
                    r"(?i)я (?:пишу|програмую) на ([a-zа-яіїєґ0-9+#.]+)",
                )
                .unwrap(),
                fact_type: FactType::ProgrammingLanguage,
                fact_key: "programming_language",
                base_confidence: 0.9,
                value_group: 1,
            },
            Rule {
                pattern: Regex::new(r"(?i)мені (\d{1,3}) рок(?:ів|и|а)\b").unwrap(),
                fact_type: FactType::Age,
                fact_key: "age",
                base_confidence: 1.0,
                value_group: 1,
            },
        ]
    })
}

/// Run every Ukrainian rule against `text`.
pub fn extract(text: &str) -> Vec<FactCandidate> {
    super::apply_rules(text, rules())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_location_from_ya_z() {
        let facts = extract("я з Києва, тут класно");
        let fact = facts
            .iter()
            .find(|f| f.fact_type == FactType::Location)
            .expect("expected a location candidate");
        assert!(fact.confidence >= 0.85);
    }

    #[test]
    fn extracts_age() {
        let facts = extract("мені 25 років");
        let age = facts.iter().find(|f| f.fact_type == FactType::Age).unwrap();
        assert_eq!(age.fact_value, "25");
    }

    #[test]
    fn extracts_programming_language() {
        let facts = extract("я програмую на rust кожен день");
        assert!(facts
            .iter()
            .any(|f| f.fact_type == FactType::ProgrammingLanguage && f.fact_value == "rust"));
    }
}

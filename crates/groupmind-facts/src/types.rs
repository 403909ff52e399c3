use serde::{Deserialize, Serialize};

/// The specific kind of fact a rule or model extractor can surface. This
/// is the `fact_key` taxonomy, not the spec.md §3 `fact_category` bucket
/// it's stored under (e.g. `Location` stores as `fact_key = "location"`
/// under `fact_category = "personal"`) — that mapping lives in
/// `groupmind_agent::fact_queue`, the one place that knows both
/// vocabularies, so this crate stays independent of the persistence
/// schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Location,
    Likes,
    Dislikes,
    Language,
    Profession,
    ProgrammingLanguage,
    Age,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Likes => "likes",
            Self::Dislikes => "dislikes",
            Self::Language => "language",
            Self::Profession => "profession",
            Self::ProgrammingLanguage => "programming_language",
            Self::Age => "age",
        }
    }
}

impl std::str::FromStr for FactType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "location" => Ok(Self::Location),
            "likes" => Ok(Self::Likes),
            "dislikes" => Ok(Self::Dislikes),
            "language" => Ok(Self::Language),
            "profession" => Ok(Self::Profession),
            "programming_language" => Ok(Self::ProgrammingLanguage),
            "age" => Ok(Self::Age),
            other => Err(format!("unknown fact type: {other}")),
        }
    }
}

/// A candidate fact surfaced by an extractor, not yet deduplicated or
/// persisted. `fact_key` is the free-form identity within `fact_type`
/// (e.g. `"location"` for a location fact, since there's normally one
/// location per person) — extractors may emit more specific keys.
#[derive(Debug, Clone, PartialEq)]
pub struct FactCandidate {
    pub fact_type: FactType,
    pub fact_key: String,
    pub fact_value: String,
    pub confidence: f64,
    pub evidence_text: String,
}

impl FactCandidate {
    /// The normalized dedup identity: `(fact_type, fact_key, normalized_value)`.
    pub fn dedup_key(&self) -> (FactType, String, String) {
        (
            self.fact_type,
            self.fact_key.clone(),
            crate::normalize::normalize_value(self.fact_type, &self.fact_value),
        )
    }
}

/// Context handed to an extractor alongside the raw message text.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    pub chat_id: i64,
    pub user_id: i64,
    pub source_message_id: Option<i64>,
}

use serde::{Deserialize, Serialize};

use groupmind_core::types::{ChatId, ConversationKey, MediaDescriptor, Role, ThreadId, TurnMetadata};

pub use groupmind_core::types::EntityType;

/// A single stored conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub message_id: i64,
    pub user_id: Option<i64>,
    pub role: Role,
    pub text: String,
    pub media: Vec<MediaDescriptor>,
    pub metadata: TurnMetadata,
    pub embedding: Option<Vec<f32>>,
    pub ts: i64,
    pub retention_days: i64,
}

impl Turn {
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(ChatId(self.chat_id), self.thread_id.map(ThreadId))
    }
}

/// New turn data supplied by the Message Handler prior to persistence.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub message_id: i64,
    pub user_id: Option<i64>,
    pub role: Role,
    pub text: String,
    pub media: Vec<MediaDescriptor>,
    pub metadata: TurnMetadata,
    pub embedding: Option<Vec<f32>>,
    pub ts: i64,
    pub retention_days: i64,
}

/// Per-(user, chat) profile, updated on every observed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub chat_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub first_seen: i64,
    pub last_seen: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The fact category taxonomy of spec.md §3: user-scoped categories
/// (`personal` through `relationship`) and chat-scoped categories
/// (`tradition` through `shared_knowledge`). This is distinct from
/// `fact_key` (e.g. `"location"`, `"likes"`), which identifies what the
/// fact is about *within* a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    // User-scoped.
    Personal,
    Preference,
    Skill,
    Trait,
    Opinion,
    Relationship,
    // Chat-scoped.
    Tradition,
    Rule,
    Norm,
    Topic,
    Culture,
    Event,
    SharedKnowledge,
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Personal => "personal",
            Self::Preference => "preference",
            Self::Skill => "skill",
            Self::Trait => "trait",
            Self::Opinion => "opinion",
            Self::Relationship => "relationship",
            Self::Tradition => "tradition",
            Self::Rule => "rule",
            Self::Norm => "norm",
            Self::Topic => "topic",
            Self::Culture => "culture",
            Self::Event => "event",
            Self::SharedKnowledge => "shared_knowledge",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for FactCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "preference" => Ok(Self::Preference),
            "skill" => Ok(Self::Skill),
            "trait" => Ok(Self::Trait),
            "opinion" => Ok(Self::Opinion),
            "relationship" => Ok(Self::Relationship),
            "tradition" => Ok(Self::Tradition),
            "rule" => Ok(Self::Rule),
            "norm" => Ok(Self::Norm),
            "topic" => Ok(Self::Topic),
            "culture" => Ok(Self::Culture),
            "event" => Ok(Self::Event),
            "shared_knowledge" => Ok(Self::SharedKnowledge),
            other => Err(format!("unknown fact category: {other}")),
        }
    }
}

/// A durable fact about a user or chat, reinforced over repeated evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub chat_context: Option<i64>,
    pub fact_category: FactCategory,
    pub fact_key: String,
    pub fact_value: String,
    pub fact_description: Option<String>,
    pub confidence: f64,
    pub evidence_count: i64,
    pub evidence_text: Option<String>,
    pub source_message_id: Option<i64>,
    pub first_observed: i64,
    pub last_reinforced: i64,
    pub is_active: bool,
    pub decay_rate: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A free-form short-term memory note for a user within a chat.
/// Capped at 15 entries per (user, chat); oldest evicted first (FIFO).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMemory {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub memory_text: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Accumulated throttle/reputation state for a user, recomputed on a
/// stale-while-revalidate schedule (see [`groupmind_throttle`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleMetrics {
    pub user_id: i64,
    pub throttle_multiplier: f64,
    pub spam_score: f64,
    pub total_requests: i64,
    pub throttled_requests: i64,
    pub burst_requests: i64,
    pub avg_request_spacing_seconds: f64,
    pub last_reputation_update: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ThrottleMetrics {
    pub fn fresh(user_id: i64, now: i64) -> Self {
        Self {
            user_id,
            throttle_multiplier: 1.0,
            spam_score: 0.0,
            total_requests: 0,
            throttled_requests: 0,
            burst_requests: 0,
            avg_request_spacing_seconds: 0.0,
            last_reputation_update: now,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One logged request, used to reconstruct the 7-day rolling window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: i64,
    pub user_id: i64,
    pub requested_at: i64,
    pub was_throttled: bool,
}

/// A ban record for a (chat, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ban {
    pub chat_id: i64,
    pub user_id: i64,
    pub created_at: i64,
}

/// Tracks the last time a given throttle/ban notice was sent, so the
/// Message Handler doesn't spam the same warning on every throttled turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub chat_id: i64,
    pub user_id: i64,
    pub reason: String,
    pub last_sent_at: i64,
}

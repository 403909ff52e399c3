use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform chat identifier (mirrors the messaging platform's numeric chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Optional sub-conversation identifier within a chat (e.g. a forum topic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub i64);

impl From<i64> for ThreadId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// The addressing/serialization key the Message Handler locks on: a chat,
/// optionally narrowed to one thread within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub chat_id: ChatId,
    pub thread_id: Option<ThreadId>,
}

impl ConversationKey {
    pub fn new(chat_id: ChatId, thread_id: Option<ThreadId>) -> Self {
        Self { chat_id, thread_id }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread_id {
            Some(t) => write!(f, "{}:{}", self.chat_id, t.0),
            None => write!(f, "{}", self.chat_id),
        }
    }
}

/// Role of a persisted conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Which side of a Fact row it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    User,
    Chat,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::User => write!(f, "user"),
            EntityType::Chat => write!(f, "chat"),
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityType::User),
            "chat" => Ok(EntityType::Chat),
            other => Err(format!("unknown entity_type: {other}")),
        }
    }
}

/// Fixed media kinds a turn may carry, replacing the original's free-form JSON bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaDescriptor {
    Photo { reference: String, mime: Option<String> },
    Video { reference: String, mime: Option<String> },
    Audio { reference: String, mime: Option<String> },
    Document { reference: String, mime: Option<String> },
    Voice { reference: String, mime: Option<String> },
    Sticker { reference: String, mime: Option<String> },
    Animation { reference: String, mime: Option<String> },
    YoutubeUrl { url: String },
}

impl MediaDescriptor {
    pub fn label(&self) -> &'static str {
        match self {
            MediaDescriptor::Photo { .. } => "photo",
            MediaDescriptor::Video { .. } => "video",
            MediaDescriptor::Audio { .. } => "audio",
            MediaDescriptor::Document { .. } => "document",
            MediaDescriptor::Voice { .. } => "voice",
            MediaDescriptor::Sticker { .. } => "sticker",
            MediaDescriptor::Animation { .. } => "animation",
            MediaDescriptor::YoutubeUrl { .. } => "youtube_url",
        }
    }

    pub fn mime(&self) -> Option<&str> {
        match self {
            MediaDescriptor::Photo { mime, .. }
            | MediaDescriptor::Video { mime, .. }
            | MediaDescriptor::Audio { mime, .. }
            | MediaDescriptor::Document { mime, .. }
            | MediaDescriptor::Voice { mime, .. }
            | MediaDescriptor::Sticker { mime, .. }
            | MediaDescriptor::Animation { mime, .. } => mime.as_deref(),
            MediaDescriptor::YoutubeUrl { .. } => None,
        }
    }
}

/// Reply-target and author-display metadata attached to a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub reply_to_message_id: Option<i64>,
    pub reply_to_user_id: Option<i64>,
    pub reply_to_name: Option<String>,
    pub reply_to_username: Option<String>,
    pub reply_excerpt: Option<String>,
}

impl TurnMetadata {
    /// Render as a `[meta] key="value" ...` prefix line, matching the
    /// convention the upstream model is instructed to strip before display.
    pub fn format_prefix(&self) -> String {
        let mut parts = Vec::new();
        if let Some(n) = &self.display_name {
            parts.push(format!("name={:?}", n));
        }
        if let Some(u) = &self.username {
            parts.push(format!("username={:?}", u));
        }
        if let Some(id) = self.reply_to_message_id {
            parts.push(format!("reply_to_message_id={id}"));
        }
        if let Some(id) = self.reply_to_user_id {
            parts.push(format!("reply_to_user_id={id}"));
        }
        if let Some(n) = &self.reply_to_name {
            parts.push(format!("reply_to_name={:?}", n));
        }
        if let Some(u) = &self.reply_to_username {
            parts.push(format!("reply_to_username={:?}", u));
        }
        if let Some(e) = &self.reply_excerpt {
            parts.push(format!("reply_excerpt={:?}", e));
        }
        if parts.is_empty() {
            return String::new();
        }
        format!("[meta] {}", parts.join(" "))
    }
}

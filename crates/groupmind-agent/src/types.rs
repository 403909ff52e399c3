//! Wire-adjacent types shared by the generation and embedding backends.
//! The concrete envelope shape (spec.md §6: `system_instruction`,
//! `contents: [{role, parts}]`, `tools`) lives only in the `reqwest`-backed
//! implementation in `backend.rs` — everything here is transport-agnostic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenRole {
    User,
    Model,
}

/// One piece of a turn's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData { mime_type: String, data_b64: String },
    FileUri { file_uri: String },
    /// A tool invocation the model requested, round-tripped back into the
    /// next turn's history so the upstream sees its own prior call.
    FunctionCall { name: String, arguments: serde_json::Value },
    /// The result of executing a `FunctionCall`, fed back as a turn.
    FunctionResponse { name: String, response: serde_json::Value },
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text { text: s.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTurn {
    pub role: GenRole,
    pub parts: Vec<Part>,
}

impl ContentTurn {
    pub fn text(role: GenRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }
}

/// A tool declaration offered to the model, matching the upstream's
/// function-calling schema (name + JSON Schema parameters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call the model asked to make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Request handed to a `GenerationBackend`.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub system_instruction: String,
    pub contents: Vec<ContentTurn>,
    pub tools: Vec<ToolDeclaration>,
}

/// Response from a `GenerationBackend`. Exactly one of `text` or
/// `tool_call` is meaningful per spec's contract: a tool call interrupts
/// generation until the handler feeds the result back.
#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    pub text: String,
    pub tool_call: Option<ToolCallRequest>,
}

/// Errors a generation or embedding backend call can fail with, before
/// the generation/embedding client reduces them to a `GroupmindError`.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

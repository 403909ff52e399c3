//! Backend traits for the upstream generative model and embedding
//! endpoints, plus the one concrete `reqwest`-backed implementation that
//! knows the wire envelope (spec.md §6). Behind a trait so the generation
//! and embedding clients — timeout, retry, circuit breaker — are testable
//! without a live network dependency, mirroring the teacher's
//! `LlmProvider` seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ContentTurn, GenerationRequest, GenerationResponse, Part, ProviderError, ToolCallRequest};

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResponse, ProviderError>;
}

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Sends the envelope spec.md §6 describes: `{system_instruction,
/// contents: [{role, parts}], tools, safety_settings}`, expecting back
/// `{candidates: [{content: {parts}}], function_call?}`.
pub struct HttpModelBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpModelBackend {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequestBody<'a> {
    system_instruction: WireSystemInstruction<'a>,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
struct WireSystemInstruction<'a> {
    parts: [WirePart<'a>; 1],
}

#[derive(Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePartOwned>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text { text: &'a str },
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePartOwned {
    Text { text: String },
    InlineData { inline_data: WireInlineData },
    FileUri { file_uri: String },
    FunctionCall { function_call: WireFunctionCall },
    FunctionResponse { function_response: WireFunctionResponse },
}

#[derive(Serialize)]
struct WireInlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct WireFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Serialize)]
struct WireFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateResponseBody {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    function_call: Option<WireFunctionCallResponse>,
}

#[derive(Deserialize)]
struct WireCandidate {
    content: WireResponseContent,
}

#[derive(Deserialize)]
struct WireResponseContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireResponsePart {
    Text { text: String },
    Other(serde_json::Value),
}

#[derive(Deserialize)]
struct WireFunctionCallResponse {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

fn to_wire_part(part: &Part) -> WirePartOwned {
    match part {
        Part::Text { text } => WirePartOwned::Text { text: text.clone() },
        Part::InlineData { mime_type, data_b64 } => WirePartOwned::InlineData {
            inline_data: WireInlineData {
                mime_type: mime_type.clone(),
                data: data_b64.clone(),
            },
        },
        Part::FileUri { file_uri } => WirePartOwned::FileUri {
            file_uri: file_uri.clone(),
        },
        Part::FunctionCall { name, arguments } => WirePartOwned::FunctionCall {
            function_call: WireFunctionCall {
                name: name.clone(),
                args: arguments.clone(),
            },
        },
        Part::FunctionResponse { name, response } => WirePartOwned::FunctionResponse {
            function_response: WireFunctionResponse {
                name: name.clone(),
                response: response.clone(),
            },
        },
    }
}

fn role_str(turn: &ContentTurn) -> &'static str {
    match turn.role {
        crate::types::GenRole::User => "user",
        crate::types::GenRole::Model => "model",
    }
}

#[async_trait]
impl GenerationBackend for HttpModelBackend {
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let body = GenerateRequestBody {
            system_instruction: WireSystemInstruction {
                parts: [WirePart::Text {
                    text: &req.system_instruction,
                }],
            },
            contents: req
                .contents
                .iter()
                .map(|turn| WireContent {
                    role: role_str(turn),
                    parts: turn.parts.iter().map(to_wire_part).collect(),
                })
                .collect(),
            tools: req
                .tools
                .iter()
                .map(|t| WireTool {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                })
                .collect(),
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, req.model);
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(5_000);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponseBody = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if let Some(call) = parsed.function_call {
            return Ok(GenerationResponse {
                text: String::new(),
                tool_call: Some(ToolCallRequest {
                    name: call.name,
                    arguments: call.args,
                }),
            });
        }

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| match p {
                        WireResponsePart::Text { text } => Some(text),
                        WireResponsePart::Other(_) => None,
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(GenerationResponse {
            text,
            tool_call: None,
        })
    }
}

#[derive(Serialize)]
struct EmbedRequestBody<'a> {
    model: &'a str,
    contents: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponseBody {
    #[serde(default)]
    embeddings: Vec<WireEmbedding>,
}

#[derive(Deserialize)]
struct WireEmbedding {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for HttpModelBackend {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/models/{}:embedContent", self.base_url, model);
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&EmbedRequestBody {
                model,
                contents: text,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbedResponseBody = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parsed
            .embeddings
            .into_iter()
            .next()
            .map(|e| e.values)
            .unwrap_or_default())
    }
}

//! Generation Client: `generate(system_prompt, history, user_parts,
//! tools, tool_executor) -> reply text`, wrapped in a timeout, a single
//! retry, and a circuit breaker; runs a bounded tool-call loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use groupmind_core::error::{GroupmindError, Result};

use crate::backend::GenerationBackend;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::types::{ContentTurn, GenRole, GenerationRequest, Part, ProviderError, ToolDeclaration};

/// Hard cap on tool-call round trips per `generate()` invocation, per
/// spec.md §4.5's "suggested 4 rounds" to prevent infinite tool loops.
const MAX_TOOL_ROUNDS: u32 = 4;

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn call(&self, name: &str, arguments: serde_json::Value) -> Result<serde_json::Value>;
}

pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    breaker: CircuitBreaker,
    model: String,
    timeout: Duration,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, model: String, timeout_secs: u64) -> Self {
        Self {
            backend,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            model,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Run the full generation+tool-loop contract, returning the model's
    /// final reply text.
    pub async fn generate(
        &self,
        system_prompt: &str,
        history: Vec<ContentTurn>,
        user_parts: Vec<Part>,
        tools: Vec<ToolDeclaration>,
        tool_executor: Option<&(dyn ToolExecutor)>,
    ) -> Result<String> {
        let mut contents = history;
        contents.push(ContentTurn {
            role: GenRole::User,
            parts: user_parts,
        });

        for round in 0..MAX_TOOL_ROUNDS {
            let req = GenerationRequest {
                model: self.model.clone(),
                system_instruction: system_prompt.to_string(),
                contents: contents.clone(),
                tools: tools.clone(),
            };

            let response = self.call_with_breaker(&req).await?;

            let Some(tool_call) = response.tool_call else {
                return Ok(response.text);
            };

            let Some(executor) = tool_executor else {
                warn!(tool = %tool_call.name, "model requested a tool call with no executor configured");
                return Ok(response.text);
            };

            contents.push(ContentTurn {
                role: GenRole::Model,
                parts: vec![Part::FunctionCall {
                    name: tool_call.name.clone(),
                    arguments: tool_call.arguments.clone(),
                }],
            });

            let tool_result = executor.call(&tool_call.name, tool_call.arguments).await?;
            contents.push(ContentTurn {
                role: GenRole::User,
                parts: vec![Part::FunctionResponse {
                    name: tool_call.name,
                    response: tool_result,
                }],
            });

            if round + 1 == MAX_TOOL_ROUNDS {
                warn!("tool-call loop hit the round cap without a final answer");
            }
        }

        Err(GroupmindError::UpstreamFailure(
            "tool-call loop exceeded round cap".to_string(),
        ))
    }

    async fn call_with_breaker(&self, req: &GenerationRequest) -> Result<crate::types::GenerationResponse> {
        let Some(permit) = self.breaker.gate() else {
            return Err(GroupmindError::CircuitBreakerOpen {
                retry_after_ms: self.breaker.retry_after_ms(),
            });
        };

        match self.call_with_retry(req).await {
            Ok(response) => {
                permit.record_success();
                Ok(response)
            }
            Err(e) => {
                permit.record_failure();
                Err(e)
            }
        }
    }

    /// A single retry after a transport failure. Rate-limit responses
    /// wait out `retry_after_ms` before the retry; other failures retry
    /// immediately once.
    async fn call_with_retry(&self, req: &GenerationRequest) -> Result<crate::types::GenerationResponse> {
        match self.call_once(req).await {
            Ok(response) => Ok(response),
            Err(first_err) => {
                if let GroupmindError::UpstreamFailure(ref msg) = first_err {
                    warn!(error = %msg, "generation call failed, retrying once");
                }
                self.call_once(req).await.map_err(|_| first_err)
            }
        }
    }

    async fn call_once(&self, req: &GenerationRequest) -> Result<crate::types::GenerationResponse> {
        match tokio::time::timeout(self.timeout, self.backend.generate(req)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(ProviderError::RateLimited { retry_after_ms })) => {
                tokio::time::sleep(Duration::from_millis(retry_after_ms.min(5_000))).await;
                Err(GroupmindError::UpstreamFailure("rate limited".to_string()))
            }
            Ok(Err(e)) => Err(GroupmindError::UpstreamFailure(e.to_string())),
            Err(_) => Err(GroupmindError::UpstreamTimeout {
                ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerationResponse, ToolCallRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubBackend {
        responses: std::sync::Mutex<Vec<Result<GenerationResponse, ProviderError>>>,
    }

    #[async_trait]
    impl GenerationBackend for StubBackend {
        async fn generate(&self, _req: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn client_with(responses: Vec<Result<GenerationResponse, ProviderError>>) -> GenerationClient {
        GenerationClient::new(
            Arc::new(StubBackend {
                responses: std::sync::Mutex::new(responses),
            }),
            "gen-default".to_string(),
            5,
        )
    }

    #[tokio::test]
    async fn plain_text_response_returns_immediately() {
        let client = client_with(vec![Ok(GenerationResponse {
            text: "hi there".to_string(),
            tool_call: None,
        })]);
        let reply = client
            .generate("system", vec![], vec![Part::text("hello")], vec![], None)
            .await
            .unwrap();
        assert_eq!(reply, "hi there");
    }

    #[tokio::test]
    async fn tool_call_invokes_executor_and_continues() {
        let client = client_with(vec![
            Ok(GenerationResponse {
                text: String::new(),
                tool_call: Some(ToolCallRequest {
                    name: "search_messages".to_string(),
                    arguments: serde_json::json!({"query": "cats"}),
                }),
            }),
            Ok(GenerationResponse {
                text: "found it".to_string(),
                tool_call: None,
            }),
        ]);

        struct EchoExecutor(AtomicUsize);
        #[async_trait]
        impl ToolExecutor for EchoExecutor {
            async fn call(&self, name: &str, _arguments: serde_json::Value) -> Result<serde_json::Value> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({"tool": name, "results": []}))
            }
        }
        let executor = EchoExecutor(AtomicUsize::new(0));

        let reply = client
            .generate("system", vec![], vec![Part::text("hello")], vec![], Some(&executor))
            .await
            .unwrap();
        assert_eq!(reply, "found it");
        assert_eq!(executor.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_retry_on_transport_failure_then_succeeds() {
        let client = client_with(vec![
            Err(ProviderError::Unavailable("flaky".to_string())),
            Ok(GenerationResponse {
                text: "recovered".to_string(),
                tool_call: None,
            }),
        ]);
        let reply = client
            .generate("system", vec![], vec![Part::text("hello")], vec![], None)
            .await
            .unwrap();
        assert_eq!(reply, "recovered");
    }

    #[tokio::test]
    async fn exhausted_retry_surfaces_upstream_failure() {
        let client = client_with(vec![
            Err(ProviderError::Unavailable("down".to_string())),
            Err(ProviderError::Unavailable("still down".to_string())),
        ]);
        let result = client
            .generate("system", vec![], vec![Part::text("hello")], vec![], None)
            .await;
        assert!(matches!(result, Err(GroupmindError::UpstreamFailure(_))));
    }

    #[tokio::test]
    async fn consecutive_failures_open_the_breaker() {
        let mut responses = Vec::new();
        for _ in 0..10 {
            responses.push(Err(ProviderError::Unavailable("down".to_string())));
        }
        let client = client_with(responses);
        for _ in 0..5 {
            let _ = client
                .generate("system", vec![], vec![Part::text("hi")], vec![], None)
                .await;
        }
        let result = client
            .generate("system", vec![], vec![Part::text("hi")], vec![], None)
            .await;
        assert!(matches!(result, Err(GroupmindError::CircuitBreakerOpen { .. })));
    }
}

//! Embedding Client: wraps the upstream embedding endpoint with a
//! concurrency-limiting semaphore. Never on the critical path — every
//! failure mode degrades to an empty vector rather than propagating.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::backend::EmbeddingBackend;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
    semaphore: Arc<Semaphore>,
    breaker: CircuitBreaker,
    model: String,
    timeout: Duration,
}

impl EmbeddingClient {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, model: String, concurrency: usize) -> Self {
        Self {
            backend,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            model,
            timeout: Duration::from_secs(10),
        }
    }

    /// Embed `text`. Rejects empty/whitespace-only input with an empty
    /// vector before even acquiring the semaphore. Any transport error,
    /// timeout, or open breaker also resolves to an empty vector, logged
    /// and telemetry-counted by the caller rather than surfaced.
    pub async fn embed_text(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let Some(permit) = self.breaker.gate() else {
            warn!("embedding circuit breaker open, skipping embedding");
            return Vec::new();
        };

        let _sem_permit = match self.semaphore.acquire().await {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };

        match tokio::time::timeout(self.timeout, self.backend.embed(&self.model, text)).await {
            Ok(Ok(vector)) => {
                permit.record_success();
                vector
            }
            Ok(Err(e)) => {
                warn!(error = %e, "embedding call failed, using empty vector");
                permit.record_failure();
                Vec::new()
            }
            Err(_) => {
                warn!("embedding call timed out, using empty vector");
                permit.record_failure();
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::types::ProviderError;

    struct StubBackend {
        result: Result<Vec<f32>, String>,
    }

    #[async_trait]
    impl EmbeddingBackend for StubBackend {
        async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>, ProviderError> {
            match &self.result {
                Ok(v) => Ok(v.clone()),
                Err(_) => Err(ProviderError::Unavailable("stub failure".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        let client = EmbeddingClient::new(
            Arc::new(StubBackend { result: Ok(vec![1.0]) }),
            "embed-default".to_string(),
            4,
        );
        assert!(client.embed_text("   ").await.is_empty());
    }

    #[tokio::test]
    async fn successful_call_returns_vector() {
        let client = EmbeddingClient::new(
            Arc::new(StubBackend {
                result: Ok(vec![0.1, 0.2, 0.3]),
            }),
            "embed-default".to_string(),
            4,
        );
        assert_eq!(client.embed_text("hello").await, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn transport_failure_resolves_to_empty_vector() {
        let client = EmbeddingClient::new(
            Arc::new(StubBackend {
                result: Err("boom".to_string()),
            }),
            "embed-default".to_string(),
            4,
        );
        assert!(client.embed_text("hello").await.is_empty());
    }
}

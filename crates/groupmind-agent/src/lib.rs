pub mod backend;
pub mod circuit_breaker;
pub mod embedding;
pub mod fact_queue;
pub mod generation;
pub mod handler;
pub mod persona;
pub mod scoped_cache;
pub mod types;

pub use backend::{EmbeddingBackend, GenerationBackend, HttpModelBackend};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use embedding::EmbeddingClient;
pub use fact_queue::FactExtractionQueue;
pub use generation::{GenerationClient, ToolExecutor};
pub use handler::{HandlerConfig, IncomingAuthor, IncomingMessage, MessageHandler};
pub use persona::Persona;
pub use scoped_cache::{ScopedCache, ScopedCacheEntry};

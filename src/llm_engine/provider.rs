//! Generation backend trait and types
//!
//! Defines the request/chunk types of the two-shape `/api/generate` contract and
//! the interface the stream relay talks to.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Error types for generation calls
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    /// Request could not be sent, timed out, or the body could not be read
    #[error("Could not reach the model server: {0}")]
    Transport(String),
    /// Non-2xx status, malformed JSON, or a reply the backend flagged as an error
    #[error("Model server error: {0}")]
    Backend(String),
    /// Markup conversion failed
    #[error("Could not render the response: {0}")]
    Parse(String),
    /// The turn was cancelled before it finished
    #[error("Response cancelled")]
    Cancelled,
}

/// Body of a `POST /api/generate` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, stream: bool) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream,
        }
    }
}

/// One increment of a streaming reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationChunk {
    pub text_fragment: String,
    pub is_final: bool,
}

impl GenerationChunk {
    pub fn new(text_fragment: impl Into<String>, is_final: bool) -> Self {
        Self {
            text_fragment: text_fragment.into(),
            is_final,
        }
    }
}

/// Chunks in arrival order. Consumed by exactly one relay call.
pub type ChunkStream = BoxStream<'static, Result<GenerationChunk, GenerationError>>;

/// The interface every inference backend implements
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name used in log lines (e.g. "ollama")
    fn provider_name(&self) -> &'static str;

    /// Run a non-streaming generation and return the raw response text
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Start a streaming generation.
    /// Resolves once the backend has accepted the request; chunks follow on the stream.
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ChunkStream, GenerationError>;
}

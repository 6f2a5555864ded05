//! LLM engine - inference backends the chat panel can talk to
//!
//! Only the Ollama HTTP API is wired up; anything speaking the same
//! `/api/generate` contract can implement [`GenerationBackend`].

pub mod provider;
pub mod providers;

pub use provider::{
    ChunkStream, GenerationBackend, GenerationChunk, GenerationError, GenerationRequest,
};
pub use providers::{OllamaConfig, OllamaProvider};

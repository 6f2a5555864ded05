//! Generation backend implementations

pub mod ollama_provider;

pub use ollama_provider::{OllamaConfig, OllamaProvider};

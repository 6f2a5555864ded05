//! Ollama API provider
//!
//! Connects to a running Ollama server (default: localhost:11434) and speaks its
//! `/api/generate` endpoint, either as one JSON reply or as an NDJSON stream.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{future, Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

use crate::llm_engine::provider::{
    ChunkStream, GenerationBackend, GenerationChunk, GenerationError, GenerationRequest,
};

/// Ollama generate reply. The same shape is used for the single batch body and
/// for every line of a streamed reply.
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Longest NDJSON line accepted from a streamed reply
pub const MAX_STREAM_LINE_BYTES: usize = 1024 * 1024;

/// Ollama version response
#[derive(Debug, Deserialize)]
struct OllamaVersion {
    version: String,
}

/// Ollama provider configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    /// Whole-request timeout, applied to batch calls only
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

/// Ollama generation backend
pub struct OllamaProvider {
    config: OllamaConfig,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| GenerationError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Check if the Ollama server is running and return its version
    pub async fn check_connection(&self) -> Result<String, GenerationError> {
        let response = self
            .client
            .get(self.endpoint("/api/version"))
            .timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .send()
            .await
            .map_err(|e| GenerationError::Transport(format!("Cannot connect to Ollama: {}", e)))?;

        if !response.status().is_success() {
            return Err(GenerationError::Backend(format!(
                "Ollama version check returned {}",
                response.status()
            )));
        }

        let version: OllamaVersion = response
            .json()
            .await
            .map_err(|e| GenerationError::Backend(format!("Invalid version response: {}", e)))?;

        Ok(version.version)
    }

    async fn post_generate(
        &self,
        request: &GenerationRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, GenerationError> {
        let mut builder = self.client.post(self.endpoint("/api/generate")).json(request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(format!(
                "Ollama returned {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl GenerationBackend for OllamaProvider {
    fn provider_name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let response = self
            .post_generate(request, Some(Duration::from_secs(self.config.request_timeout_secs)))
            .await?;

        let reply: OllamaGenerateResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                GenerationError::Backend(format!("Invalid response: {}", e))
            } else {
                GenerationError::Transport(format!("Failed to read response: {}", e))
            }
        })?;

        if let Some(error) = reply.error {
            return Err(GenerationError::Backend(error));
        }

        reply
            .response
            .ok_or_else(|| GenerationError::Backend("Reply has no `response` field".to_string()))
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<ChunkStream, GenerationError> {
        let response = self.post_generate(request, None).await?;
        log::debug!("Ollama accepted streaming request for model {}", request.model);

        Ok(ndjson_chunks(response.bytes_stream().map_err(std::io::Error::other)))
    }
}

/// Reassemble an NDJSON body into chunks. Lines may be split across network
/// reads; blank lines are skipped.
pub(crate) fn ndjson_chunks<S>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    ndjson_chunks_with_max(body, MAX_STREAM_LINE_BYTES)
}

fn ndjson_chunks_with_max<S>(body: S, max_line_bytes: usize) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    let codec = LinesCodec::new_with_max_length(max_line_bytes);
    FramedRead::new(StreamReader::new(body), codec)
        .filter_map(|line| {
            future::ready(match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(parse_stream_line(&line)),
                Err(LinesCodecError::Io(e)) => {
                    Some(Err(GenerationError::Transport(format!("Stream error: {}", e))))
                }
                Err(e) => Some(Err(GenerationError::Backend(format!("Invalid stream line: {}", e)))),
            })
        })
        .boxed()
}

fn parse_stream_line(line: &str) -> Result<GenerationChunk, GenerationError> {
    let reply: OllamaGenerateResponse = serde_json::from_str(line)
        .map_err(|e| GenerationError::Backend(format!("Invalid stream line: {}", e)))?;

    if let Some(error) = reply.error {
        return Err(GenerationError::Backend(error));
    }

    Ok(GenerationChunk::new(reply.response.unwrap_or_default(), reply.done))
}

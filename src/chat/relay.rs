//! Stream relay - turns one generation call into an ordered run of UI events
//!
//! Every call is bracketed by `ShowLoader` / `HideLoader`. In between it emits
//! either the final markup or exactly one `Error`, never both.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::chat::markup::markdown_to_markup;
use crate::chat::types::{UiEvent, UiEventSink};
use crate::llm_engine::provider::{GenerationBackend, GenerationError, GenerationRequest};

/// Longest wait for the next streamed chunk
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How the backend is called
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// One request, one JSON reply
    Batch,
    /// NDJSON chunks, re-rendered as they arrive
    #[default]
    Streaming,
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayMode::Batch => write!(f, "batch"),
            RelayMode::Streaming => write!(f, "streaming"),
        }
    }
}

impl FromStr for RelayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "batch" => Ok(RelayMode::Batch),
            "streaming" | "stream" => Ok(RelayMode::Streaming),
            other => Err(format!("unknown relay mode '{}' (expected batch or streaming)", other)),
        }
    }
}

/// Text received so far in the current turn
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: String,
    chunks: usize,
}

impl ResponseAccumulator {
    pub fn push(&mut self, fragment: &str) -> &str {
        self.text.push_str(fragment);
        self.chunks += 1;
        &self.text
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }
}

/// Issues generation requests and reports their progress as [`UiEvent`]s
pub struct StreamRelay {
    backend: Arc<dyn GenerationBackend>,
    model: String,
    idle_timeout: Duration,
}

impl StreamRelay {
    pub fn new(backend: Arc<dyn GenerationBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
        }
    }

    /// Fail a streaming turn once the backend has been silent this long
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Await `fut`, giving up after the idle timeout
    async fn within_idle<F: Future>(&self, fut: F) -> Result<F::Output, GenerationError> {
        tokio::time::timeout(self.idle_timeout, fut).await.map_err(|_| {
            GenerationError::Transport(format!(
                "no data from the model server for {:?}",
                self.idle_timeout
            ))
        })
    }

    /// Run one turn. Returns the final markup on success.
    ///
    /// Failures are reported to `sink` as a single `Error` event before being
    /// returned; `HideLoader` is always the last event.
    pub async fn relay(
        &self,
        prompt: &str,
        mode: RelayMode,
        sink: &dyn UiEventSink,
        cancel_token: &CancellationToken,
    ) -> Result<String, GenerationError> {
        log::info!(
            "Relaying prompt ({} chars) to {} model '{}' in {} mode",
            prompt.len(),
            self.backend.provider_name(),
            self.model,
            mode
        );

        sink.emit(UiEvent::ShowLoader);

        let result = match mode {
            RelayMode::Batch => self.run_batch(prompt, sink, cancel_token).await,
            RelayMode::Streaming => self.run_streaming(prompt, sink, cancel_token).await,
        };

        if let Err(e) = &result {
            log::warn!("Relay failed: {}", e);
            sink.emit(UiEvent::Error(e.to_string()));
        }

        sink.emit(UiEvent::HideLoader);
        result
    }

    async fn run_batch(
        &self,
        prompt: &str,
        sink: &dyn UiEventSink,
        cancel_token: &CancellationToken,
    ) -> Result<String, GenerationError> {
        let request = GenerationRequest::new(self.model.as_str(), prompt, false);

        let text = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(GenerationError::Cancelled),
            result = self.backend.generate(&request) => result?,
        };

        let markup = markdown_to_markup(&text);
        sink.emit(UiEvent::ResponseDone(markup.clone()));
        Ok(markup)
    }

    async fn run_streaming(
        &self,
        prompt: &str,
        sink: &dyn UiEventSink,
        cancel_token: &CancellationToken,
    ) -> Result<String, GenerationError> {
        sink.emit(UiEvent::ResponseStarted);

        let request = GenerationRequest::new(self.model.as_str(), prompt, true);
        let mut stream = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(GenerationError::Cancelled),
            result = self.within_idle(self.backend.generate_stream(&request)) => result??,
        };

        let mut accumulator = ResponseAccumulator::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => return Err(GenerationError::Cancelled),
                next = self.within_idle(stream.next()) => next?,
            };

            let chunk = match next {
                Some(chunk) => chunk?,
                None => {
                    return Err(GenerationError::Backend(
                        "Stream ended before the final chunk".to_string(),
                    ))
                }
            };

            let accumulated = accumulator.push(&chunk.text_fragment);
            let markup = markdown_to_markup(accumulated);

            chunk_trace!(
                "Chunk {} (+{} bytes, {} total, final={})",
                accumulator.chunk_count(),
                chunk.text_fragment.len(),
                accumulator.as_str().len(),
                chunk.is_final
            );

            if chunk.is_final {
                log::info!(
                    "Stream finished after {} chunks ({} chars)",
                    accumulator.chunk_count(),
                    accumulator.as_str().len()
                );
                sink.emit(UiEvent::ResponseDone(markup.clone()));
                return Ok(markup);
            }

            sink.emit(UiEvent::ResponseUpdated(markup));
        }
    }
}

// Ask AI - chat panel sidecar for a local Ollama server
//
// The editor host spawns this process and exchanges panel protocol lines
// with it over stdin/stdout. Each submission is turned into a prompt, sent
// to Ollama, and the reply is streamed back as panel markup.

use anyhow::Context;
use std::sync::Arc;

// Chunk logging macros - exported for use by other modules
#[macro_use]
pub mod macros;

pub mod chat;
pub mod config;
pub mod host;
pub mod llm_engine;

pub use chat::{ChatPanel, PanelOptions, StreamRelay};
pub use config::AskAiConfig;
pub use llm_engine::{GenerationBackend, OllamaProvider};

/// Initialize env_logger to output to stderr (reads RUST_LOG env var).
/// stdout is reserved for protocol lines.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .target(env_logger::Target::Stderr)
        .init();
}

/// Run the sidecar until stdin closes
pub async fn run() -> anyhow::Result<()> {
    let config = AskAiConfig::load().context("Failed to load configuration")?;
    log::info!(
        "Using model '{}' at {} ({} mode, busy policy {})",
        config.model,
        config.base_url,
        config.mode,
        config.busy_policy
    );

    let provider = OllamaProvider::new(config.ollama_config())
        .context("Failed to create Ollama client")?;

    match provider.check_connection().await {
        Ok(version) => log::info!("Connected to Ollama {}", version),
        Err(e) => log::warn!(
            "Ollama is not reachable at {} yet ({}); requests will fail until it is",
            provider.base_url(),
            e
        ),
    }

    let backend: Arc<dyn GenerationBackend> = Arc::new(provider);
    let selection = Arc::new(host::SharedSelection::new());
    let panel = ChatPanel::new(
        StreamRelay::new(backend, config.model.as_str())
            .with_idle_timeout(config.stream_idle_timeout()),
        selection.clone(),
        Arc::new(host::StdioPanel::stdout()),
        config.panel_options(),
    );

    panel.initialize().await;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    host::serve(stdin, &panel, &selection)
        .await
        .context("Failed to read from stdin")?;

    log::info!("Ask AI sidecar shutting down");
    Ok(())
}

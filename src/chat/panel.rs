//! Chat panel controller
//!
//! One `ChatPanel` per open panel. It owns the transcript and the turn state,
//! runs each turn's relay on its own task and translates relay events into
//! panel commands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::chat::prompt::compose;
use crate::chat::relay::{RelayMode, StreamRelay};
use crate::chat::turn::{ActiveTurn, BusyPolicy, TurnTracker};
use crate::chat::types::{ChatMessage, Sender, UiEvent, UiEventSink};
use crate::host::protocol::{PanelCommand, PanelSink};
use crate::host::selection::SelectionSource;

/// Shown to the host when a submission is refused under [`BusyPolicy::Reject`]
pub const BUSY_NOTICE: &str = "Still answering the previous question. Please wait for it to finish.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelOptions {
    pub mode: RelayMode,
    pub busy_policy: BusyPolicy,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("turn {0} is still in flight")]
    Busy(Uuid),
}

/// Handle on a started turn
#[derive(Debug)]
pub struct TurnTicket {
    pub turn_id: Uuid,
    handle: JoinHandle<()>,
}

impl TurnTicket {
    /// Wait for the turn's task to exit
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            log::error!("Turn {} task failed: {}", self.turn_id, e);
        }
    }
}

struct PanelInner {
    relay: StreamRelay,
    options: PanelOptions,
    selection: Arc<dyn SelectionSource>,
    sink: Arc<dyn PanelSink>,
    transcript: RwLock<Vec<ChatMessage>>,
    turns: TurnTracker,
}

#[derive(Clone)]
pub struct ChatPanel {
    inner: Arc<PanelInner>,
}

impl ChatPanel {
    pub fn new(
        relay: StreamRelay,
        selection: Arc<dyn SelectionSource>,
        sink: Arc<dyn PanelSink>,
        options: PanelOptions,
    ) -> Self {
        Self {
            inner: Arc::new(PanelInner {
                relay,
                options,
                selection,
                sink,
                transcript: RwLock::new(Vec::new()),
                turns: TurnTracker::new(),
            }),
        }
    }

    /// Seed the panel with the current transcript
    pub async fn initialize(&self) {
        let messages = self.inner.transcript.read().await.clone();
        log::info!("Initializing panel with {} messages", messages.len());
        self.inner.sink.post(PanelCommand::Initialize { messages });
    }

    /// Dispatch one command received from the panel or host
    pub async fn handle(&self, command: PanelCommand) {
        if command.is_panel_bound() {
            log::warn!("Ignoring panel-bound command '{}' received inbound", command.name());
            return;
        }

        match command {
            PanelCommand::SendMessage { text } => {
                if let Err(e) = self.submit(text).await {
                    log::info!("Submission refused: {}", e);
                }
            }
            PanelCommand::Ready => self.initialize().await,
            PanelCommand::Alert { text } => {
                self.inner.sink.post(PanelCommand::Alert { text });
            }
            PanelCommand::SelectionChanged { .. } => {
                log::debug!("Selection update reached the panel; the transport owns the selection");
            }
            other => log::warn!("Unhandled inbound command '{}'", other.name()),
        }
    }

    /// Start a turn for `text`.
    ///
    /// The user message is recorded and echoed before the relay starts. The
    /// relay itself runs on a spawned task.
    pub async fn submit(&self, text: String) -> Result<TurnTicket, SubmitError> {
        let inner = &self.inner;

        let turn = match inner.options.busy_policy {
            BusyPolicy::Reject => match inner.turns.try_begin() {
                Ok(turn) => turn,
                Err(running) => {
                    log::warn!("Rejecting submission while turn {} is in flight", running.turn_id);
                    inner.sink.post(PanelCommand::Alert {
                        text: BUSY_NOTICE.to_string(),
                    });
                    return Err(SubmitError::Busy(running.turn_id));
                }
            },
            BusyPolicy::CancelPrevious => {
                let (turn, previous) = inner.turns.replace();
                if let Some(previous) = previous {
                    log::info!("Cancelling turn {} for turn {}", previous.turn_id, turn.turn_id);
                    previous.cancel_token.cancel();
                    previous.wait_finished().await;
                }
                turn
            }
        };

        inner.transcript.write().await.push(ChatMessage::user(text.as_str()));
        inner.sink.post(PanelCommand::AddMessage {
            text: text.clone(),
            sender: Sender::User,
        });

        let selection = inner.selection.selected_text();
        let prompt = compose(&text, &selection);
        log::debug!(
            "Turn {}: prompt of {} chars ({} chars of selection)",
            turn.turn_id,
            prompt.len(),
            selection.len()
        );

        let turn_id = turn.turn_id;
        let handle = tokio::spawn(run_turn(self.inner.clone(), turn, prompt));

        Ok(TurnTicket { turn_id, handle })
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.inner.transcript.read().await.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.turns.is_in_flight()
    }

    /// Cancel the in-flight turn, if any, and wait for it to wind down
    pub async fn shutdown(&self) {
        if let Some(turn) = self.inner.turns.current() {
            log::info!("Shutting down: cancelling turn {}", turn.turn_id);
            turn.cancel_token.cancel();
            turn.wait_finished().await;
        }
    }
}

async fn run_turn(inner: Arc<PanelInner>, turn: ActiveTurn, prompt: String) {
    let renderer = TurnRenderer::new(inner.sink.clone());

    let result = inner
        .relay
        .relay(&prompt, inner.options.mode, &renderer, &turn.cancel_token)
        .await;

    match result {
        Ok(markup) => {
            inner.transcript.write().await.push(ChatMessage::bot(markup));
            log::info!("Turn {} completed", turn.turn_id);
        }
        Err(e) => log::info!("Turn {} ended without a reply: {}", turn.turn_id, e),
    }

    inner.turns.finish(&turn);
}

/// Maps one turn's [`UiEvent`]s onto panel commands
pub struct TurnRenderer {
    sink: Arc<dyn PanelSink>,
    response_open: AtomicBool,
}

impl TurnRenderer {
    pub fn new(sink: Arc<dyn PanelSink>) -> Self {
        Self {
            sink,
            response_open: AtomicBool::new(false),
        }
    }

    /// Finish the reply in the open response div, or as a standalone bot message
    fn complete(&self, text: String) {
        if self.response_open.swap(false, Ordering::SeqCst) {
            self.sink.post(PanelCommand::AddResponseMessage { text, is_done: true });
        } else {
            self.sink.post(PanelCommand::AddMessage {
                text,
                sender: Sender::Bot,
            });
        }
    }
}

impl UiEventSink for TurnRenderer {
    fn emit(&self, event: UiEvent) {
        match event {
            UiEvent::ShowLoader => self.sink.post(PanelCommand::ShowLoader),
            UiEvent::HideLoader => self.sink.post(PanelCommand::HideLoader),
            UiEvent::ResponseStarted => {
                self.response_open.store(true, Ordering::SeqCst);
                self.sink.post(PanelCommand::AddResponseDiv);
            }
            UiEvent::ResponseUpdated(text) => {
                self.sink.post(PanelCommand::AddResponseMessage {
                    text,
                    is_done: false,
                });
            }
            UiEvent::ResponseDone(text) => self.complete(text),
            // Overwrites any partial reply
            UiEvent::Error(message) => self.complete(format!("Error: {}", message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::relay::tests::{Script, ScriptedBackend};
    use crate::host::selection::SharedSelection;
    use crate::llm_engine::provider::{GenerationChunk, GenerationError};
    use tokio::sync::mpsc;

    struct Harness {
        panel: ChatPanel,
        selection: Arc<SharedSelection>,
        commands: mpsc::UnboundedReceiver<PanelCommand>,
    }

    impl Harness {
        fn new(backend: Arc<ScriptedBackend>, mode: RelayMode, busy_policy: BusyPolicy) -> Self {
            let (tx, commands) = mpsc::unbounded_channel();
            let selection = Arc::new(SharedSelection::new());
            let panel = ChatPanel::new(
                StreamRelay::new(backend, "llama2"),
                selection.clone(),
                Arc::new(tx),
                PanelOptions { mode, busy_policy },
            );
            Self {
                panel,
                selection,
                commands,
            }
        }

        fn drain(&mut self) -> Vec<PanelCommand> {
            let mut out = Vec::new();
            while let Ok(command) = self.commands.try_recv() {
                out.push(command);
            }
            out
        }
    }

    fn user(text: &str) -> PanelCommand {
        PanelCommand::AddMessage {
            text: text.to_string(),
            sender: Sender::User,
        }
    }

    fn response(text: &str, is_done: bool) -> PanelCommand {
        PanelCommand::AddResponseMessage {
            text: text.to_string(),
            is_done,
        }
    }

    #[tokio::test]
    async fn test_streaming_turn_commands_and_transcript() {
        let backend = ScriptedBackend::chunks(&[("Hel", false), ("lo", false), ("!", true)]);
        let mut h = Harness::new(backend, RelayMode::Streaming, BusyPolicy::Reject);

        let ticket = h.panel.submit("Say hello".to_string()).await.unwrap();
        ticket.join().await;

        assert_eq!(
            h.drain(),
            vec![
                user("Say hello"),
                PanelCommand::ShowLoader,
                PanelCommand::AddResponseDiv,
                response("Hel", false),
                response("Hello", false),
                response("Hello!", true),
                PanelCommand::HideLoader,
            ]
        );
        assert_eq!(
            h.panel.transcript().await,
            vec![ChatMessage::user("Say hello"), ChatMessage::bot("Hello!")]
        );
        assert!(!h.panel.is_busy());
    }

    #[tokio::test]
    async fn test_batch_reply_is_a_bot_message() {
        let backend = ScriptedBackend::new(Script::Batch(Ok("Done\nhere".to_string())));
        let mut h = Harness::new(backend, RelayMode::Batch, BusyPolicy::Reject);

        h.panel.submit("q".to_string()).await.unwrap().join().await;

        assert_eq!(
            h.drain(),
            vec![
                user("q"),
                PanelCommand::ShowLoader,
                PanelCommand::AddMessage {
                    text: "Done<br>here".to_string(),
                    sender: Sender::Bot,
                },
                PanelCommand::HideLoader,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_stream_overwrites_partial_reply() {
        let backend = ScriptedBackend::new(Script::Chunks(vec![
            Ok(GenerationChunk::new("partial", false)),
            Err(GenerationError::Backend("model not found".to_string())),
        ]));
        let mut h = Harness::new(backend, RelayMode::Streaming, BusyPolicy::Reject);

        h.panel.submit("q".to_string()).await.unwrap().join().await;

        let commands = h.drain();
        assert_eq!(
            &commands[commands.len() - 2..],
            &[
                response("Error: Model server error: model not found", true),
                PanelCommand::HideLoader,
            ]
        );
        assert_eq!(h.panel.transcript().await, vec![ChatMessage::user("q")]);
    }

    #[tokio::test]
    async fn test_failed_batch_posts_error_message() {
        let backend = ScriptedBackend::new(Script::Reject(GenerationError::Transport(
            "connection refused".to_string(),
        )));
        let mut h = Harness::new(backend, RelayMode::Batch, BusyPolicy::Reject);

        h.panel.submit("q".to_string()).await.unwrap().join().await;

        assert_eq!(
            h.drain(),
            vec![
                user("q"),
                PanelCommand::ShowLoader,
                PanelCommand::AddMessage {
                    text: "Error: Could not reach the model server: connection refused"
                        .to_string(),
                    sender: Sender::Bot,
                },
                PanelCommand::HideLoader,
            ]
        );
    }

    #[tokio::test]
    async fn test_selection_is_read_into_prompt() {
        let backend = ScriptedBackend::chunks(&[("ok", true)]);
        let h = Harness::new(backend.clone(), RelayMode::Streaming, BusyPolicy::Reject);

        h.selection.set("let x = 1;");
        h.panel.submit("Explain".to_string()).await.unwrap().join().await;

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].prompt, compose("Explain", "let x = 1;"));
    }

    #[tokio::test]
    async fn test_reject_policy_refuses_overlapping_submission() {
        let backend = ScriptedBackend::new(Script::Stall);
        let mut h = Harness::new(backend, RelayMode::Streaming, BusyPolicy::Reject);

        let first = h.panel.submit("one".to_string()).await.unwrap();
        let refused = h.panel.submit("two".to_string()).await;
        assert_eq!(refused.err(), Some(SubmitError::Busy(first.turn_id)));

        h.panel.shutdown().await;
        first.join().await;

        let commands = h.drain();
        assert!(commands.contains(&PanelCommand::Alert {
            text: BUSY_NOTICE.to_string()
        }));
        assert!(!commands.contains(&user("two")));
        assert_eq!(h.panel.transcript().await, vec![ChatMessage::user("one")]);
    }

    #[tokio::test]
    async fn test_cancel_previous_winds_down_old_turn_first() {
        let backend = ScriptedBackend::new(Script::Stall);
        let mut h = Harness::new(backend, RelayMode::Streaming, BusyPolicy::CancelPrevious);

        let first = h.panel.submit("one".to_string()).await.unwrap();
        let second = h.panel.submit("two".to_string()).await.unwrap();
        assert_ne!(first.turn_id, second.turn_id);
        first.join().await;

        h.panel.shutdown().await;
        second.join().await;

        let commands = h.drain();
        assert_eq!(
            &commands[..6],
            &[
                user("one"),
                PanelCommand::ShowLoader,
                PanelCommand::AddResponseDiv,
                response("Error: Response cancelled", true),
                PanelCommand::HideLoader,
                user("two"),
            ]
        );
        assert!(!h.panel.is_busy());
    }

    #[tokio::test]
    async fn test_initialize_and_inbound_dispatch() {
        let backend = ScriptedBackend::chunks(&[("hi", true)]);
        let mut h = Harness::new(backend, RelayMode::Streaming, BusyPolicy::Reject);

        h.panel.initialize().await;
        h.panel.handle(PanelCommand::ShowLoader).await;
        h.panel
            .handle(PanelCommand::Alert {
                text: "copied".to_string(),
            })
            .await;

        assert_eq!(
            h.drain(),
            vec![
                PanelCommand::Initialize { messages: vec![] },
                PanelCommand::Alert {
                    text: "copied".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_ready_reseeds_transcript() {
        let backend = ScriptedBackend::chunks(&[("Hi", false), ("!", true)]);
        let mut h = Harness::new(backend, RelayMode::Streaming, BusyPolicy::Reject);

        h.panel.submit("hello".to_string()).await.unwrap().join().await;
        h.drain();

        h.panel.handle(PanelCommand::Ready).await;
        h.panel
            .handle(PanelCommand::Initialize { messages: vec![] })
            .await;

        assert_eq!(
            h.drain(),
            vec![PanelCommand::Initialize {
                messages: vec![ChatMessage::user("hello"), ChatMessage::bot("Hi!")],
            }]
        );
    }

    #[test]
    fn test_renderer_without_open_div_posts_bot_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let renderer = TurnRenderer::new(Arc::new(tx));

        renderer.emit(UiEvent::ResponseDone("a".to_string()));
        renderer.emit(UiEvent::ResponseStarted);
        renderer.emit(UiEvent::ResponseDone("b".to_string()));

        assert_eq!(
            rx.try_recv().unwrap(),
            PanelCommand::AddMessage {
                text: "a".to_string(),
                sender: Sender::Bot
            }
        );
        assert_eq!(rx.try_recv().unwrap(), PanelCommand::AddResponseDiv);
        assert_eq!(rx.try_recv().unwrap(), response("b", true));
    }
}

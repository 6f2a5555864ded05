//! Chat types shared by the relay, the panel and the host protocol

use serde::{Deserialize, Serialize};

/// Who wrote a transcript entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

/// One transcript entry. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
        }
    }
}

/// UI notifications produced by the stream relay for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    ShowLoader,
    /// A new bot reply placeholder was opened
    ResponseStarted,
    /// Full re-render of the text accumulated so far
    ResponseUpdated(String),
    /// Final markup of the reply
    ResponseDone(String),
    HideLoader,
    /// User-visible failure notice
    Error(String),
}

/// Receiver of relay events
pub trait UiEventSink: Send + Sync {
    fn emit(&self, event: UiEvent);
}

impl UiEventSink for tokio::sync::mpsc::UnboundedSender<UiEvent> {
    fn emit(&self, event: UiEvent) {
        if self.send(event).is_err() {
            log::debug!("UI event receiver dropped");
        }
    }
}

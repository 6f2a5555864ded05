//! Chat module for asking a local model about the editor selection
//!
//! This module provides:
//! - Prompt composition from the user's message and the selection
//! - The stream relay that turns a generation call into UI events
//! - Markdown to panel markup conversion
//! - The per-panel controller with its transcript and turn state
//!
//! Module structure:
//! - types.rs: ChatMessage, Sender, UiEvent, UiEventSink
//! - prompt.rs: compose
//! - markup.rs: markdown_to_markup
//! - relay.rs: StreamRelay, RelayMode
//! - turn.rs: TurnTracker, BusyPolicy
//! - panel.rs: ChatPanel, TurnRenderer

pub mod types;
pub mod prompt;
pub mod markup;
pub mod relay;
pub mod turn;
pub mod panel;

pub use types::{ChatMessage, Sender, UiEvent, UiEventSink};
pub use prompt::compose;
pub use markup::markdown_to_markup;
pub use relay::{RelayMode, ResponseAccumulator, StreamRelay};
pub use turn::{BusyPolicy, TurnTracker};
pub use panel::{ChatPanel, PanelOptions, SubmitError, TurnRenderer, TurnTicket};

//! Panel/host message protocol
//!
//! Every message is a JSON object tagged by its `command` field. Lines are
//! decoded into [`PanelCommand`] at the boundary; anything else is rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::types::{ChatMessage, Sender};

/// Every command the panel and host exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PanelCommand {
    /// Append a finished message to the transcript view
    AddMessage { text: String, sender: Sender },
    ShowLoader,
    HideLoader,
    /// Open the placeholder for a streamed bot reply
    AddResponseDiv,
    /// Replace the open reply's content with a fresh render
    AddResponseMessage { text: String, is_done: bool },
    /// Seed the transcript when the panel is created
    Initialize { messages: Vec<ChatMessage> },
    /// Notification passthrough to the host
    Alert { text: String },
    /// User submission from the panel
    SendMessage { text: String },
    /// Current editor selection; empty when nothing is selected
    SelectionChanged { text: String },
    /// Panel (re)created and waiting for its transcript
    Ready,
}

/// Wire names of every [`PanelCommand`] variant
pub const COMMAND_NAMES: &[&str] = &[
    "addMessage",
    "showLoader",
    "hideLoader",
    "addResponseDiv",
    "addResponseMessage",
    "initialize",
    "alert",
    "sendMessage",
    "selectionChanged",
    "ready",
];

/// Why an incoming line was not turned into a command
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("message has no `command` field")]
    MissingCommand,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("malformed '{command}' command: {source}")]
    Malformed {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PanelCommand {
    /// Decode one protocol line
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line).map_err(ProtocolError::InvalidJson)?;

        let command = value
            .get("command")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingCommand)?
            .to_string();

        if !COMMAND_NAMES.contains(&command.as_str()) {
            return Err(ProtocolError::UnknownCommand(command));
        }

        serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { command, source })
    }

    /// Encode as a single protocol line (no trailing newline)
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            PanelCommand::AddMessage { .. } => "addMessage",
            PanelCommand::ShowLoader => "showLoader",
            PanelCommand::HideLoader => "hideLoader",
            PanelCommand::AddResponseDiv => "addResponseDiv",
            PanelCommand::AddResponseMessage { .. } => "addResponseMessage",
            PanelCommand::Initialize { .. } => "initialize",
            PanelCommand::Alert { .. } => "alert",
            PanelCommand::SendMessage { .. } => "sendMessage",
            PanelCommand::SelectionChanged { .. } => "selectionChanged",
            PanelCommand::Ready => "ready",
        }
    }

    /// Commands that only ever travel towards the panel
    pub fn is_panel_bound(&self) -> bool {
        !matches!(
            self,
            PanelCommand::Alert { .. }
                | PanelCommand::SendMessage { .. }
                | PanelCommand::SelectionChanged { .. }
                | PanelCommand::Ready
        )
    }
}

/// Destination for outgoing panel commands
pub trait PanelSink: Send + Sync {
    fn post(&self, command: PanelCommand);
}

impl PanelSink for tokio::sync::mpsc::UnboundedSender<PanelCommand> {
    fn post(&self, command: PanelCommand) {
        if self.send(command).is_err() {
            log::debug!("Panel command receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_uses_wire_names() {
        let line = PanelCommand::AddResponseMessage {
            text: "Hi<br>".to_string(),
            is_done: true,
        }
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            json!({"command": "addResponseMessage", "text": "Hi<br>", "isDone": true})
        );

        let line = PanelCommand::AddMessage {
            text: "hello".to_string(),
            sender: Sender::Bot,
        }
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value, json!({"command": "addMessage", "text": "hello", "sender": "bot"}));

        let value: Value =
            serde_json::from_str(&PanelCommand::ShowLoader.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"command": "showLoader"}));
    }

    #[test]
    fn test_initialize_carries_transcript() {
        let command = PanelCommand::Initialize {
            messages: vec![ChatMessage::user("q"), ChatMessage::bot("a")],
        };
        let value: Value = serde_json::from_str(&command.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "command": "initialize",
                "messages": [
                    {"sender": "user", "text": "q"},
                    {"sender": "bot", "text": "a"}
                ]
            })
        );
    }

    #[test]
    fn test_decode_inbound_commands() {
        assert_eq!(
            PanelCommand::decode(r#"{"command":"sendMessage","text":"How?"}"#).unwrap(),
            PanelCommand::SendMessage {
                text: "How?".to_string()
            }
        );
        assert_eq!(
            PanelCommand::decode(r#"{"command":"alert","text":"hey"}"#).unwrap(),
            PanelCommand::Alert {
                text: "hey".to_string()
            }
        );
        assert_eq!(
            PanelCommand::decode(r#"{"command":"hideLoader"}"#).unwrap(),
            PanelCommand::HideLoader
        );
        assert_eq!(
            PanelCommand::decode(r#"{"command":"ready"}"#).unwrap(),
            PanelCommand::Ready
        );
    }

    #[test]
    fn test_every_variant_name_is_listed() {
        let commands = vec![
            PanelCommand::AddMessage {
                text: String::new(),
                sender: Sender::User,
            },
            PanelCommand::ShowLoader,
            PanelCommand::HideLoader,
            PanelCommand::AddResponseDiv,
            PanelCommand::AddResponseMessage {
                text: String::new(),
                is_done: false,
            },
            PanelCommand::Initialize { messages: vec![] },
            PanelCommand::Alert {
                text: String::new(),
            },
            PanelCommand::SendMessage {
                text: String::new(),
            },
            PanelCommand::SelectionChanged {
                text: String::new(),
            },
            PanelCommand::Ready,
        ];
        assert_eq!(commands.len(), COMMAND_NAMES.len());

        for command in commands {
            assert!(COMMAND_NAMES.contains(&command.name()));
            let decoded = PanelCommand::decode(&command.encode().unwrap()).unwrap();
            assert_eq!(decoded, command);
        }
    }

    #[test]
    fn test_decode_rejections() {
        assert!(matches!(
            PanelCommand::decode(r#"{"command":"openSettings"}"#),
            Err(ProtocolError::UnknownCommand(name)) if name == "openSettings"
        ));
        assert!(matches!(
            PanelCommand::decode(r#"{"text":"no command"}"#),
            Err(ProtocolError::MissingCommand)
        ));
        assert!(matches!(
            PanelCommand::decode("not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            PanelCommand::decode(r#"{"command":"sendMessage"}"#),
            Err(ProtocolError::Malformed { command, .. }) if command == "sendMessage"
        ));
    }

    #[test]
    fn test_direction() {
        assert!(PanelCommand::AddResponseDiv.is_panel_bound());
        assert!(PanelCommand::Initialize { messages: vec![] }.is_panel_bound());
        assert!(!PanelCommand::Ready.is_panel_bound());
        assert!(!PanelCommand::SendMessage {
            text: "x".to_string()
        }
        .is_panel_bound());
    }
}

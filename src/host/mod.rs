//! Host side of the chat panel: wire protocol, selection and stdio transport

pub mod protocol;
pub mod selection;
pub mod stdio;

pub use protocol::{PanelCommand, PanelSink, ProtocolError};
pub use selection::{SelectionSource, SharedSelection};
pub use stdio::{dispatch_line, serve, LinePanel, StdioPanel};

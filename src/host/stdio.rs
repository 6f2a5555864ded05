//! Line-delimited JSON transport over stdin/stdout
//!
//! stdout carries nothing but protocol lines; all logging goes to stderr.

use std::io::{self, Write};
use std::sync::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::chat::panel::ChatPanel;
use crate::host::protocol::{PanelCommand, PanelSink, ProtocolError};
use crate::host::selection::SharedSelection;

/// Writes each command as one JSON line and flushes
pub struct LinePanel<W: Write + Send> {
    writer: Mutex<W>,
}

pub type StdioPanel = LinePanel<io::Stdout>;

impl StdioPanel {
    pub fn stdout() -> Self {
        LinePanel::new(io::stdout())
    }
}

impl<W: Write + Send> LinePanel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{}", line)?;
        writer.flush()
    }
}

impl<W: Write + Send> PanelSink for LinePanel<W> {
    fn post(&self, command: PanelCommand) {
        let line = match command.encode() {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to encode '{}' command: {}", command.name(), e);
                return;
            }
        };

        if let Err(e) = self.write_line(&line) {
            log::error!("Failed to write '{}' command: {}", command.name(), e);
        }
    }
}

/// Read protocol lines until EOF, dispatching each with [`dispatch_line`].
///
/// Lines that are not valid UTF-8 are skipped. On EOF or a read error any
/// in-flight turn is cancelled and awaited.
pub async fn serve<R>(reader: R, panel: &ChatPanel, selection: &SharedSelection) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch_line(&line, panel, selection).await,
            Ok(None) => break,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                log::error!("Skipping unreadable line: {}", e);
                continue;
            }
            Err(e) => {
                log::error!("Failed to read input: {}", e);
                panel.shutdown().await;
                return Err(e);
            }
        }
    }

    log::info!("Input closed, shutting down panel");
    panel.shutdown().await;
    Ok(())
}

/// Decode one protocol line and act on it.
///
/// `selectionChanged` updates `selection` directly; everything else goes to
/// the panel. Blank and undecodable lines are skipped.
pub async fn dispatch_line(line: &str, panel: &ChatPanel, selection: &SharedSelection) {
    if line.trim().is_empty() {
        return;
    }

    let command = match PanelCommand::decode(line) {
        Ok(command) => command,
        Err(ProtocolError::UnknownCommand(name)) => {
            log::warn!("Ignoring unknown command '{}'", name);
            return;
        }
        Err(e) => {
            log::error!("Failed to decode message: {}", e);
            return;
        }
    };

    log::debug!("Received '{}'", command.name());

    match command {
        PanelCommand::SelectionChanged { text } => selection.set(text),
        other => panel.handle(other).await,
    }
}

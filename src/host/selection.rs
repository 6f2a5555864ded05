//! Editor selection source

use std::sync::RwLock;

/// Supplies the editor's current selection at submission time
pub trait SelectionSource: Send + Sync {
    /// Empty string when nothing is selected
    fn selected_text(&self) -> String;
}

/// Selection kept up to date by `selectionChanged` messages from the host
#[derive(Debug, Default)]
pub struct SharedSelection {
    text: RwLock<String>,
}

impl SharedSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, text: impl Into<String>) {
        let mut current = self.text.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = text.into();
    }
}

impl SelectionSource for SharedSelection {
    fn selected_text(&self) -> String {
        self.text
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

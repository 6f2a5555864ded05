//! Prompt composition for a single chat turn

/// Opening marker of the editor-selection section
pub const CONTEXT_BEGIN: &str = "--- BEGIN CONTEXT (selected text) ---";
/// Closing marker of the editor-selection section
pub const CONTEXT_END: &str = "--- END CONTEXT ---";

/// Appended to every prompt
pub const INSTRUCTION_SUFFIX: &str = "Answer in Markdown. Structure the answer with headings, \
put any code in fenced code blocks tagged with the language, and keep explanations concise.";

/// Build the text sent to the model from the user's message and the editor selection.
///
/// A whitespace-only selection counts as no selection. The selection itself is
/// copied verbatim.
pub fn compose(user_text: &str, selection: &str) -> String {
    let mut sections: Vec<String> = Vec::with_capacity(3);

    if !selection.trim().is_empty() {
        sections.push(format!("{}\n{}\n{}", CONTEXT_BEGIN, selection, CONTEXT_END));
    }

    if !user_text.is_empty() {
        sections.push(user_text.to_string());
    }

    sections.push(INSTRUCTION_SUFFIX.to_string());
    sections.join("\n\n")
}

//! Markdown to panel markup conversion
//!
//! Runs once per re-render over the whole accumulated reply. Fenced code blocks
//! become `<pre><code class="language-…">` elements; every other newline becomes
//! a `<br>`. Everything else passes through untouched.

use once_cell::sync::Lazy;
use regex::Regex;

/// Language tag used when a fence has none
pub const DEFAULT_LANGUAGE: &str = "plaintext";

/// ```lang\ncode``` - the newline after the opening fence is required
static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```([\w+#.-]*)[ \t]*\n(.*?)```").expect("Invalid regex")
});

/// Convert a markdown reply into panel markup.
pub fn markdown_to_markup(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() + 64);
    let mut last = 0;

    for caps in CODE_FENCE_RE.captures_iter(markdown) {
        let Some(block) = caps.get(0) else {
            continue;
        };

        push_text(&mut out, &markdown[last..block.start()]);

        let language = caps
            .get(1)
            .map(|m| m.as_str())
            .filter(|lang| !lang.is_empty())
            .unwrap_or(DEFAULT_LANGUAGE);
        let code = caps.get(2).map_or("", |m| m.as_str());

        out.push_str("<pre><code class=\"language-");
        out.push_str(language);
        out.push_str("\">");
        push_escaped(&mut out, code);
        out.push_str("</code></pre>");

        last = block.end();
    }

    push_text(&mut out, &markdown[last..]);
    out
}

fn push_text(out: &mut String, text: &str) {
    let mut lines = text.split('\n');
    if let Some(first) = lines.next() {
        out.push_str(first);
    }
    for line in lines {
        out.push_str("<br>");
        out.push_str(line);
    }
}

fn push_escaped(out: &mut String, code: &str) {
    for ch in code.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

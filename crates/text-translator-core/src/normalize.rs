//! Turns raw backend output into display-safe markup.
//!
//! Escaping runs exactly once, before the ANSI sequences are swapped for
//! tags. The conversion is not idempotent: feeding already-normalized text
//! back in escapes the `&` of every entity a second time.

/// ANSI sequences emitted by translate-shell and their markup equivalents.
const ANSI_TAGS: [(&str, &str); 4] = [
    ("\x1B[1m", "<b>"),
    ("\x1B[22m", "</b>"),
    ("\x1B[4m", "<u>"),
    ("\x1B[24m", "</u>"),
];

/// Escape the five HTML-reserved characters in a single pass.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape raw output, then map bold/underline sequences to `<b>`/`<u>` tags.
///
/// Replacement is literal, so partial or unknown escape sequences pass
/// through unchanged.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    ANSI_TAGS
        .iter()
        .fold(escape_html(raw), |text, (sequence, tag)| text.replace(sequence, tag))
}

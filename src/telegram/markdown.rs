//! MarkdownV2 escaping for user-derived text
//!
//! Titles and error strings come from the outside world and must never be
//! able to break message formatting. Static message text is escaped by hand
//! at the call site; everything dynamic goes through [`escape_markdown`].

/// Escapes the characters MarkdownV2 treats as entity markers:
/// `_`, `*`, `[`, `]`, `(`, `)`, `~`, `` ` ``, `>`, `#`, `+`, `-`, `=`,
/// `|`, `{`, `}`, `.`, `!`
///
/// The backslash is escaped first so already-escaped input is not
/// double-processed into broken entities.
///
/// # Example
///
/// ```
/// use tugboat::telegram::markdown::escape_markdown;
///
/// assert_eq!(escape_markdown("Hello. World!"), "Hello\\. World\\!");
/// ```
pub fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len() * 2);

    for c in text.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '_' => result.push_str("\\_"),
            '*' => result.push_str("\\*"),
            '[' => result.push_str("\\["),
            ']' => result.push_str("\\]"),
            '(' => result.push_str("\\("),
            ')' => result.push_str("\\)"),
            '~' => result.push_str("\\~"),
            '`' => result.push_str("\\`"),
            '>' => result.push_str("\\>"),
            '#' => result.push_str("\\#"),
            '+' => result.push_str("\\+"),
            '-' => result.push_str("\\-"),
            '=' => result.push_str("\\="),
            '|' => result.push_str("\\|"),
            '{' => result.push_str("\\{"),
            '}' => result.push_str("\\}"),
            '.' => result.push_str("\\."),
            '!' => result.push_str("\\!"),
            _ => result.push(c),
        }
    }

    result
}

use std::borrow::Cow;

/// Safely returns a prefix of the string with at most `max_chars` characters.
/// This respects UTF-8 character boundaries.
pub fn prefix_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Shortened form of a frame payload for log lines, with an ellipsis when cut.
pub fn log_snippet(s: &str, max_chars: usize) -> Cow<'_, str> {
    let prefix = prefix_chars(s, max_chars);
    if prefix.len() == s.len() {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(format!("{}...", prefix))
    }
}

/// Gerrit's own limit on a single human review comment. Other review
/// systems may carry a different ceiling; callers outside the Gerrit
/// driver should supply their own.
pub const GERRIT_COMMENT_LIMIT: usize = 16_056;

const TRUNCATION_MARKER: &str = "... (truncated)";

/// Truncates `message` to at most `limit` bytes, appending a visible
/// marker when truncation occurred. Cuts on a char boundary so the
/// result is always valid UTF-8.
#[must_use]
pub fn truncate_message(message: &str, limit: usize) -> String {
    if message.len() <= limit {
        return message.to_string();
    }
    let budget = limit.saturating_sub(TRUNCATION_MARKER.len());
    let mut end = budget.min(message.len());
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{TRUNCATION_MARKER}", &message[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_passes_through_unchanged() {
        assert_eq!(truncate_message("hello", 100), "hello");
    }

    #[test]
    fn long_message_is_cut_with_a_visible_marker() {
        let message = "x".repeat(100);
        let truncated = truncate_message(&message, 40);
        assert!(truncated.len() <= 40);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_never_splits_a_multibyte_character() {
        let message = "é".repeat(50); // each 'é' is 2 bytes in UTF-8
        let truncated = truncate_message(&message, 21);
        assert!(truncated.is_char_boundary(truncated.len() - TRUNCATION_MARKER.len()));
    }

    #[test]
    fn gerrit_limit_matches_spec() {
        assert_eq!(GERRIT_COMMENT_LIMIT, 16_056);
    }
}

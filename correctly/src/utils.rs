use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as milliseconds since Unix epoch.
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

/// Cuts `text` to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Checks if a character is sentence-ending punctuation, including the ellipsis.
pub fn is_sentence_punctuation(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '…')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("……", 1), "…");
    }

    #[test]
    fn sentence_punctuation_includes_ellipsis() {
        assert!(is_sentence_punctuation('…'));
        assert!(is_sentence_punctuation('?'));
        assert!(!is_sentence_punctuation(','));
    }
}

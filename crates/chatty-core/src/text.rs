/// Number of whitespace-delimited tokens in a chat message.
///
/// Never returns 0: a message that reaches the statistics engine counts as
/// at least one word, even if it somehow trimmed down to nothing.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count().max(1)
}

pub fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    let len = s.len();
    if index >= len {
        return len;
    }

    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }

    index
}

/// Splits text into chunks of at most `max_len` bytes, preferring newline
/// boundaries, for transports with a per-message length cap.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let chunk_len = if remaining.len() <= max_len {
            remaining.len()
        } else {
            let boundary = floor_char_boundary(remaining, max_len.min(remaining.len()));
            remaining[..boundary].rfind('\n').unwrap_or(boundary)
        };
        chunks.push(remaining[..chunk_len].to_string());
        remaining = &remaining[chunk_len..];
        if remaining.starts_with('\n') {
            remaining = &remaining[1..];
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_basic() {
        assert_eq!(word_count("gg wp"), 2);
        assert_eq!(word_count("one"), 1);
        assert_eq!(word_count("  spaced   out  tokens "), 3);
    }

    #[test]
    fn test_word_count_never_zero() {
        assert_eq!(word_count(""), 1);
        assert_eq!(word_count("   "), 1);
    }

    #[test]
    fn test_floor_char_boundary_multibyte() {
        let s = "héllo";
        // 'é' spans bytes 1..3; index 2 is inside it.
        assert_eq!(floor_char_boundary(s, 2), 1);
        assert_eq!(floor_char_boundary(s, 100), s.len());
    }

    #[test]
    fn test_split_text_short_passthrough() {
        assert_eq!(split_text("hi", 10), vec!["hi"]);
    }

    #[test]
    fn test_split_text_prefers_newline() {
        let chunks = split_text("alpha\nbeta gamma", 10);
        assert_eq!(chunks, vec!["alpha", "beta gamma"]);
    }
}

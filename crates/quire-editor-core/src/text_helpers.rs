//! Char-offset helpers over plain `&str`.
//!
//! Everything in the editor speaks character offsets. These convert to byte
//! indices at the edges.

/// Number of chars in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of char offset `offset`, clamped to the end of the text.
pub fn char_to_byte(text: &str, offset: usize) -> usize {
    text.char_indices()
        .nth(offset)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

/// Char offset of byte index `byte`. `byte` must be on a char boundary.
pub fn byte_to_char(text: &str, byte: usize) -> usize {
    char_len(&text[..byte.min(text.len())])
}

/// Slice `text` by char offsets.
pub fn slice_chars(text: &str, start: usize, end: usize) -> &str {
    let start_byte = char_to_byte(text, start);
    let end_byte = char_to_byte(text, end.max(start));
    &text[start_byte..end_byte]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_to_byte_multibyte() {
        let text = "héllo 世界";
        assert_eq!(char_to_byte(text, 0), 0);
        assert_eq!(char_to_byte(text, 2), 3);
        assert_eq!(char_to_byte(text, 7), 10);
        assert_eq!(char_to_byte(text, 8), text.len());
        assert_eq!(char_to_byte(text, 100), text.len());
    }

    #[test]
    fn test_slice_chars() {
        let text = "a→b→c";
        assert_eq!(slice_chars(text, 1, 4), "→b→");
        assert_eq!(slice_chars(text, 3, 1), "");
    }
}

//! Token splicing for in-flight image uploads.
//!
//! A pending image is referenced in the text as `![alt](token)` where the
//! token is unique per upload. When the upload settles, every occurrence of
//! the token in the *current* text is replaced or removed, and the selection
//! is shifted so the caret stays where the user left it.

use std::ops::Range;

use regex::Regex;

use crate::text_helpers::{byte_to_char, char_len, char_to_byte};
use crate::types::Selection;

/// Text plus selection after a splice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spliced {
    pub text: String,
    pub selection: Selection,
    /// Number of occurrences touched.
    pub count: usize,
}

/// `![alt](url)` with characters that would break the syntax stripped from `alt`.
pub fn image_reference(alt: &str, url: &str) -> String {
    let alt: String = alt
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '\n' | '\r'))
        .collect();
    format!("![{}]({})", alt.trim(), url)
}

/// Insert an image reference on its own line at the caret (end of the selection).
///
/// The caret ends up after the reference, at the start of the following line.
pub fn insert_image_reference(text: &str, selection: Selection, alt: &str, url: &str) -> Spliced {
    let sel = selection.clamp(char_len(text));
    let at = char_to_byte(text, sel.end);

    let mut insert = String::new();
    if at > 0 && !text[..at].ends_with('\n') {
        insert.push('\n');
    }
    insert.push_str(&image_reference(alt, url));
    insert.push('\n');

    let mut out = String::with_capacity(text.len() + insert.len());
    out.push_str(&text[..at]);
    out.push_str(&insert);
    out.push_str(&text[at..]);

    let caret = sel.end + char_len(&insert);
    Spliced {
        text: out,
        selection: Selection::collapsed(caret),
        count: 1,
    }
}

/// Replace every occurrence of `token` with `url`.
pub fn replace_token(text: &str, selection: Selection, token: &str, url: &str) -> Spliced {
    if token.is_empty() {
        return unchanged(text, selection);
    }
    let ranges: Vec<Range<usize>> = text
        .match_indices(token)
        .map(|(start, m)| start..start + m.len())
        .collect();
    splice_ranges(text, selection, &ranges, url)
}

/// Remove every `![alt](token)` reference, then any bare occurrence of
/// `token` that is left.
///
/// A reference alone on its line takes one line break with it: the one after
/// it, or the one before it when it was the last line. This undoes the breaks
/// [`insert_image_reference`] adds.
pub fn remove_placeholder(text: &str, selection: Selection, token: &str) -> Spliced {
    if token.is_empty() {
        return unchanged(text, selection);
    }
    let pattern = format!(r"!\[[^\]\n]*\]\({}\)", regex::escape(token));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(error = %e, "placeholder pattern failed to compile");
            return replace_token(text, selection, token, "");
        }
    };
    let mut references: Vec<Range<usize>> = Vec::new();
    for m in re.find_iter(text) {
        let mut range = reference_line(text, m.range());
        if let Some(prev) = references.last() {
            range.start = range.start.max(prev.end);
        }
        references.push(range);
    }
    let first = splice_ranges(text, selection, &references, "");
    let rest = replace_token(&first.text, first.selection, token, "");
    Spliced {
        count: first.count + rest.count,
        ..rest
    }
}

/// Widen a reference's byte range to the line break that goes with it.
fn reference_line(text: &str, reference: Range<usize>) -> Range<usize> {
    let Range { start, end } = reference;
    let own_line = start == 0 || text[..start].ends_with('\n');
    if !own_line {
        return start..end;
    }
    let rest = &text[end..];
    let last_line = rest.is_empty() || rest == "\n";
    match (rest.starts_with('\n'), last_line && start > 0) {
        (true, true) => start - 1..end + 1,
        (true, false) => start..end + 1,
        (false, true) => start - 1..end,
        (false, false) => start..end,
    }
}

fn unchanged(text: &str, selection: Selection) -> Spliced {
    Spliced {
        text: text.to_string(),
        selection: selection.clamp(char_len(text)),
        count: 0,
    }
}

/// Replace non-overlapping byte ranges (ascending) with `replacement`.
fn splice_ranges(
    text: &str,
    selection: Selection,
    ranges: &[Range<usize>],
    replacement: &str,
) -> Spliced {
    let mut out = String::with_capacity(text.len());
    let mut selection = selection.clamp(char_len(text));
    let replacement_chars = char_len(replacement);
    let mut last = 0;
    // Char delta between the original text and the output built so far.
    let mut delta: isize = 0;

    for range in ranges {
        out.push_str(&text[last..range.start]);
        out.push_str(replacement);
        last = range.end;

        let at = byte_to_char(text, range.start);
        let removed = char_len(&text[range.clone()]);
        let at_now = (at as isize + delta) as usize;
        selection = selection.shift_for_edit(at_now, removed, replacement_chars);
        delta += replacement_chars as isize - removed as isize;
    }
    out.push_str(&text[last..]);

    Spliced {
        text: out,
        selection,
        count: ranges.len(),
    }
}

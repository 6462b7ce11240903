//! Toolbar formatting: apply markdown syntax around a selection.
//!
//! [`apply_format`] is pure. It splits the text into `before`, `selected` and
//! `after` at the (clamped) selection, builds a replacement for `selected`
//! and reports where the caret should land. Applying the result to a live
//! edit surface is the caller's job.

use std::ops::Range;

use quire_common::PlaceholderText;

use crate::text_helpers::{char_len, slice_chars};
use crate::types::Selection;

/// Formatting actions available from the toolbar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Bold,
    Italic,
    Strikethrough,
    InlineCode,
    Heading(u8), // 1-4
    Quote,
    CodeBlock,
    Link,
    Image,
    UnorderedList,
    OrderedList,
    Checklist,
    Divider,
}

impl FormatKind {
    /// Parse a toolbar key. Unknown keys return `None` and must be a no-op.
    pub fn from_key(key: &str) -> Option<Self> {
        let kind = match key.trim().to_ascii_lowercase().as_str() {
            "bold" => Self::Bold,
            "italic" => Self::Italic,
            "strikethrough" | "strike" => Self::Strikethrough,
            "code" | "inline-code" => Self::InlineCode,
            "heading1" | "h1" => Self::Heading(1),
            "heading2" | "h2" => Self::Heading(2),
            "heading3" | "h3" => Self::Heading(3),
            "heading4" | "h4" => Self::Heading(4),
            "quote" | "blockquote" => Self::Quote,
            "code-block" | "codeblock" => Self::CodeBlock,
            "link" => Self::Link,
            "image" => Self::Image,
            "unordered-list" | "ul" | "bullet-list" => Self::UnorderedList,
            "ordered-list" | "ol" | "numbered-list" => Self::OrderedList,
            "checklist" | "task" => Self::Checklist,
            "divider" | "hr" => Self::Divider,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical key for this format.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Strikethrough => "strikethrough",
            Self::InlineCode => "code",
            Self::Heading(1) => "heading1",
            Self::Heading(2) => "heading2",
            Self::Heading(3) => "heading3",
            Self::Heading(_) => "heading4",
            Self::Quote => "quote",
            Self::CodeBlock => "code-block",
            Self::Link => "link",
            Self::Image => "image",
            Self::UnorderedList => "unordered-list",
            Self::OrderedList => "ordered-list",
            Self::Checklist => "checklist",
            Self::Divider => "divider",
        }
    }

    pub fn all() -> [FormatKind; 16] {
        [
            Self::Bold,
            Self::Italic,
            Self::Strikethrough,
            Self::InlineCode,
            Self::Heading(1),
            Self::Heading(2),
            Self::Heading(3),
            Self::Heading(4),
            Self::Quote,
            Self::CodeBlock,
            Self::Link,
            Self::Image,
            Self::UnorderedList,
            Self::OrderedList,
            Self::Checklist,
            Self::Divider,
        ]
    }
}

/// Result of a formatting action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transformed {
    pub text: String,
    pub selection: Selection,
    /// Char range of the replacement in `text`. For an empty input selection,
    /// deleting this range restores the original text.
    pub inserted: Range<usize>,
}

/// Replacement text for the selected span plus the caret inside it, both in chars.
struct Replacement {
    text: String,
    caret: Range<usize>,
}

impl Replacement {
    fn new(text: String, caret: Range<usize>) -> Self {
        Self { text, caret }
    }

    /// Caret collapsed at the end of the replacement.
    fn caret_at_end(text: String) -> Self {
        let end = char_len(&text);
        Self::new(text, end..end)
    }

    /// Put the replacement on its own line(s).
    fn on_own_line(mut self, before: &str, after: &str) -> Self {
        if !before.is_empty() && !before.ends_with('\n') {
            self.text.insert(0, '\n');
            self.caret = self.caret.start + 1..self.caret.end + 1;
        }
        if !after.is_empty() && !after.starts_with('\n') {
            self.text.push('\n');
        }
        self
    }
}

/// Apply `kind` to `text` at `selection`.
pub fn apply_format(
    text: &str,
    selection: Selection,
    kind: FormatKind,
    placeholders: &PlaceholderText,
) -> Transformed {
    let len = char_len(text);
    let sel = selection.clamp(len);
    let before = slice_chars(text, 0, sel.start);
    let selected = slice_chars(text, sel.start, sel.end);
    let after = slice_chars(text, sel.end, len);

    let replacement = match kind {
        FormatKind::Bold => wrap_inline("**", selected, &placeholders.bold),
        FormatKind::Italic => wrap_inline("*", selected, &placeholders.italic),
        FormatKind::Strikethrough => wrap_inline("~~", selected, &placeholders.strikethrough),
        FormatKind::InlineCode => wrap_inline("`", selected, &placeholders.code),
        FormatKind::Link => link(selected, placeholders),
        FormatKind::Image => image(selected, placeholders),
        FormatKind::Heading(level) => {
            let hashes = "#".repeat(level.clamp(1, 4) as usize);
            prefix_lines(selected, &placeholders.heading, |_| format!("{hashes} "))
                .on_own_line(before, after)
        }
        FormatKind::Quote => {
            prefix_lines(selected, &placeholders.quote, |_| "> ".to_string())
                .on_own_line(before, after)
        }
        FormatKind::UnorderedList => {
            prefix_lines(selected, &placeholders.list_item, |_| "- ".to_string())
                .on_own_line(before, after)
        }
        FormatKind::OrderedList => {
            prefix_lines(selected, &placeholders.list_item, |n| format!("{n}. "))
                .on_own_line(before, after)
        }
        FormatKind::Checklist => {
            prefix_lines(selected, &placeholders.checklist_item, |_| "- [ ] ".to_string())
                .on_own_line(before, after)
        }
        FormatKind::CodeBlock => {
            code_block(selected, &placeholders.code_block).on_own_line(before, after)
        }
        FormatKind::Divider => divider(before, selected, after),
    };

    let mut new_text = String::with_capacity(text.len() + replacement.text.len());
    new_text.push_str(before);
    new_text.push_str(&replacement.text);
    new_text.push_str(after);

    let inserted = sel.start..sel.start + char_len(&replacement.text);
    let selection = Selection::new(
        sel.start + replacement.caret.start,
        sel.start + replacement.caret.end,
    );

    tracing::trace!(
        format = kind.key(),
        from = ?sel,
        to = ?selection,
        "applied format"
    );

    Transformed {
        text: new_text,
        selection,
        inserted,
    }
}

/// Parse `key` and apply it. Unknown keys return `None`, leaving the text untouched.
pub fn apply_format_key(
    text: &str,
    selection: Selection,
    key: &str,
    placeholders: &PlaceholderText,
) -> Option<Transformed> {
    let kind = FormatKind::from_key(key)?;
    Some(apply_format(text, selection, kind, placeholders))
}

/// Wrap with `marker` on both sides.
///
/// With a selection the caret covers the whole wrapped span, markers included.
/// Without one the placeholder is inserted and selected.
fn wrap_inline(marker: &str, selected: &str, placeholder: &str) -> Replacement {
    if selected.is_empty() {
        let open = char_len(marker);
        let text = format!("{marker}{placeholder}{marker}");
        Replacement::new(text, open..open + char_len(placeholder))
    } else {
        let text = format!("{marker}{selected}{marker}");
        let end = char_len(&text);
        Replacement::new(text, 0..end)
    }
}

/// `[text](url)`. Selects the url when text was selected, else the text placeholder.
fn link(selected: &str, placeholders: &PlaceholderText) -> Replacement {
    let url = placeholders.link_url.as_str();
    if selected.is_empty() {
        let body = placeholders.link_text.as_str();
        let text = format!("[{body}]({url})");
        Replacement::new(text, 1..1 + char_len(body))
    } else {
        let text = format!("[{selected}]({url})");
        let url_start = 1 + char_len(selected) + 2;
        Replacement::new(text, url_start..url_start + char_len(url))
    }
}

/// `![alt](url)` with the url placeholder selected.
fn image(selected: &str, placeholders: &PlaceholderText) -> Replacement {
    let alt = if selected.is_empty() {
        placeholders.image_alt.as_str()
    } else {
        selected
    };
    let url = placeholders.link_url.as_str();
    let text = format!("![{alt}]({url})");
    let url_start = 2 + char_len(alt) + 2;
    Replacement::new(text, url_start..url_start + char_len(url))
}

/// Prefix every non-blank line of the selection, or a single placeholder line.
///
/// `prefix` receives the 1-based index among non-blank lines.
fn prefix_lines(
    selected: &str,
    placeholder: &str,
    prefix: impl Fn(usize) -> String,
) -> Replacement {
    if selected.is_empty() {
        let prefix = prefix(1);
        let start = char_len(&prefix);
        return Replacement::new(
            format!("{prefix}{placeholder}"),
            start..start + char_len(placeholder),
        );
    }

    let mut n = 0;
    let lines: Vec<String> = selected
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                n += 1;
                format!("{}{}", prefix(n), line)
            }
        })
        .collect();
    Replacement::caret_at_end(lines.join("\n"))
}

fn code_block(selected: &str, placeholder: &str) -> Replacement {
    if selected.is_empty() {
        let text = format!("```\n{placeholder}\n```");
        Replacement::new(text, 4..4 + char_len(placeholder))
    } else {
        let body = selected.strip_suffix('\n').unwrap_or(selected);
        Replacement::caret_at_end(format!("```\n{body}\n```"))
    }
}

/// Keep the selected text and put a `---` line after it, caret on the next line.
fn divider(before: &str, selected: &str, after: &str) -> Replacement {
    let mut text = selected.to_string();
    let needs_break = if selected.is_empty() {
        !before.is_empty() && !before.ends_with('\n')
    } else {
        !selected.ends_with('\n')
    };
    if needs_break {
        text.push('\n');
    }
    text.push_str("---");
    if !after.starts_with('\n') {
        text.push('\n');
    }
    Replacement::caret_at_end(text)
}

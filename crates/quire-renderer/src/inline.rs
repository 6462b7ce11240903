//! Inline spans: code, emphasis, strikethrough, links and images.
//!
//! Each line is indexed once up front ([`Line::new`]): code span pairs,
//! delimiter runs by marker and length, matching brackets and `)` positions.
//! The scanner then walks the line asking whether a span starts at each
//! position, answering from the index instead of searching ahead. Literal
//! text is always escaped on the way out.
//!
//! Delimiters only match a closing run of the same length, so `***x***` is
//! one bold+italic span and a stray `**` stays literal. Runs inside code
//! spans never close anything.
//!
//! Spans nest at most [`MAX_NESTING`] deep; anything below that is written as
//! escaped literal text.

use std::collections::HashMap;
use std::ops::Range;

use markdown_weaver_escape::{StrWrite, escape_href, escape_html};

use crate::render::ImageResolver;
use crate::url::sanitize_url;
use crate::writer::PreviewWriter;

pub(crate) const MAX_NESTING: usize = 32;

/// A span found in a [`Line`]. Ranges are byte offsets into the line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Span<'a> {
    Code(&'a str),
    StrongEm(Range<usize>),
    Strong(Range<usize>),
    Em(Range<usize>),
    Del(Range<usize>),
    Image { alt: &'a str, url: &'a str },
    Link { label: Range<usize>, url: &'a str },
}

impl<'r, W, R> PreviewWriter<'r, W, R>
where
    W: StrWrite,
    R: ImageResolver,
{
    pub(crate) fn inline(&mut self, text: &str) -> Result<(), W::Error> {
        let line = Line::new(text);
        self.inline_range(&line, 0..text.len(), 0)
    }

    fn inline_range(
        &mut self,
        line: &Line<'_>,
        range: Range<usize>,
        depth: usize,
    ) -> Result<(), W::Error> {
        let text = line.text;
        if depth > MAX_NESTING {
            return escape_html(&mut self.writer, &text[range]);
        }
        let mut plain = range.start;
        let mut i = range.start;
        while i < range.end {
            match line.span_at(i, range.end) {
                Some((span, end)) => {
                    escape_html(&mut self.writer, &text[plain..i])?;
                    self.span(line, span, depth)?;
                    i = end;
                    plain = end;
                }
                None => {
                    i += text[i..].chars().next().map_or(1, char::len_utf8);
                }
            }
        }
        escape_html(&mut self.writer, &text[plain..range.end])
    }

    fn span(&mut self, line: &Line<'_>, span: Span<'_>, depth: usize) -> Result<(), W::Error> {
        match span {
            Span::Code(code) => {
                self.write("<code>")?;
                escape_html(&mut self.writer, code)?;
                self.write("</code>")
            }
            Span::StrongEm(inner) => {
                self.wrap(line, "<strong><em>", inner, "</em></strong>", depth)
            }
            Span::Strong(inner) => self.wrap(line, "<strong>", inner, "</strong>", depth),
            Span::Em(inner) => self.wrap(line, "<em>", inner, "</em>", depth),
            Span::Del(inner) => self.wrap(line, "<del>", inner, "</del>", depth),
            Span::Image { alt, url } => {
                let src = self
                    .resolver
                    .resolve_image_url(url)
                    .or_else(|| sanitize_url(url).map(str::to_string));
                match src {
                    Some(src) => {
                        self.write("<img src=\"")?;
                        escape_href(&mut self.writer, &src)?;
                        self.write("\" alt=\"")?;
                        escape_html(&mut self.writer, alt)?;
                        self.write("\">")
                    }
                    None => {
                        tracing::debug!(url, "dropped unsafe image source");
                        escape_html(&mut self.writer, alt)
                    }
                }
            }
            Span::Link { label, url } => match sanitize_url(url) {
                Some(href) => {
                    self.write("<a href=\"")?;
                    escape_href(&mut self.writer, href)?;
                    self.write("\">")?;
                    self.inline_range(line, label, depth + 1)?;
                    self.write("</a>")
                }
                None => {
                    tracing::debug!(url, "dropped unsafe link target");
                    self.inline_range(line, label, depth + 1)
                }
            },
        }
    }

    fn wrap(
        &mut self,
        line: &Line<'_>,
        open: &str,
        inner: Range<usize>,
        close: &str,
        depth: usize,
    ) -> Result<(), W::Error> {
        self.write(open)?;
        self.inline_range(line, inner, depth + 1)?;
        self.write(close)
    }
}

/// One line of inline text with its delimiters indexed.
pub(crate) struct Line<'a> {
    text: &'a str,
    /// Start of every `*` and `~` run outside code spans, keyed by marker
    /// and exact run length, ascending.
    runs: HashMap<(u8, usize), Vec<usize>>,
    /// Code span opening run start to closing run start.
    code: HashMap<usize, usize>,
    /// `[` to its matching `]`.
    brackets: HashMap<usize, usize>,
    /// Every `)`, ascending.
    parens: Vec<usize>,
}

impl<'a> Line<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        let bytes = text.as_bytes();
        let mut marker_runs = Vec::new();
        let mut ticks: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut brackets = HashMap::new();
        let mut open = Vec::new();
        let mut parens = Vec::new();

        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                marker @ (b'*' | b'~' | b'`') => {
                    let len = run_len(bytes, i, marker);
                    if marker == b'`' {
                        ticks.entry(len).or_default().push(i);
                    }
                    marker_runs.push((marker, i, len));
                    i += len;
                    continue;
                }
                b'[' => open.push(i),
                b']' => {
                    if let Some(o) = open.pop() {
                        brackets.insert(o, i);
                    }
                }
                b')' => parens.push(i),
                _ => {}
            }
            i += 1;
        }

        // Code spans pair left to right, each opener with the next backtick
        // run of the same length. Runs they cover are not delimiters.
        let mut code = HashMap::new();
        let mut runs: HashMap<(u8, usize), Vec<usize>> = HashMap::new();
        let mut covered_until = 0;
        for (marker, start, len) in marker_runs {
            if start < covered_until {
                continue;
            }
            if marker == b'`' {
                let close = ticks
                    .get(&len)
                    .and_then(|starts| next_at_or_after(starts, start + len));
                if let Some(close) = close {
                    code.insert(start, close);
                    covered_until = close + len;
                }
            } else {
                runs.entry((marker, len)).or_default().push(start);
            }
        }

        Self {
            text,
            runs,
            code,
            brackets,
            parens,
        }
    }

    /// The span starting at byte `i` and ending by `end`, with the byte
    /// offset just past it.
    pub(crate) fn span_at(&self, i: usize, end: usize) -> Option<(Span<'a>, usize)> {
        let bytes = self.text.as_bytes();
        match bytes[i] {
            b'`' => self.code_span(i, end),
            b'*' => self.emphasis(i, end),
            b'~' => self.strikethrough(i, end),
            // Image syntax is link syntax behind a `!`, so it is claimed here
            // before the `[` can be read as a link.
            b'!' if i + 1 < end && bytes[i + 1] == b'[' => {
                let (alt, url, stop) = self.link_parts(i + 1, end)?;
                Some((
                    Span::Image {
                        alt: &self.text[alt],
                        url,
                    },
                    stop,
                ))
            }
            b'[' => {
                let (label, url, stop) = self.link_parts(i, end)?;
                Some((Span::Link { label, url }, stop))
            }
            _ => None,
        }
    }

    fn code_span(&self, i: usize, end: usize) -> Option<(Span<'a>, usize)> {
        let close = *self.code.get(&i)?;
        let n = run_len(self.text.as_bytes(), i, b'`');
        if close + n > end {
            return None;
        }
        Some((Span::Code(&self.text[i + n..close]), close + n))
    }

    /// Inner range between an opening run at `i` and a closing run of the
    /// same length. The opener must not be followed by whitespace and the
    /// closer must not be preceded by it.
    fn delimited(&self, i: usize, end: usize, marker: u8) -> Option<(usize, Range<usize>, usize)> {
        let bytes = self.text.as_bytes();
        if i > 0 && bytes[i - 1] == marker {
            return None;
        }
        let n = run_len(&bytes[..end], i, marker);
        let open_end = i + n;
        match self.text[open_end..end].chars().next() {
            Some(c) if !c.is_whitespace() => {}
            _ => return None,
        }
        let close = next_at_or_after(self.runs.get(&(marker, n))?, open_end)?;
        if close + n > end {
            return None;
        }
        let inner = &self.text[open_end..close];
        if inner.is_empty() || inner.ends_with(char::is_whitespace) {
            return None;
        }
        Some((n, open_end..close, close + n))
    }

    fn emphasis(&self, i: usize, end: usize) -> Option<(Span<'a>, usize)> {
        let (n, inner, stop) = self.delimited(i, end, b'*')?;
        let span = match n {
            3 => Span::StrongEm(inner),
            2 => Span::Strong(inner),
            1 => Span::Em(inner),
            _ => return None,
        };
        Some((span, stop))
    }

    fn strikethrough(&self, i: usize, end: usize) -> Option<(Span<'a>, usize)> {
        match self.delimited(i, end, b'~')? {
            (2, inner, stop) => Some((Span::Del(inner), stop)),
            _ => None,
        }
    }

    /// `[label](url)` starting at the `[` at `open`. Returns the label range,
    /// url and end.
    ///
    /// Brackets in the label may nest. A title after the url is dropped.
    fn link_parts(&self, open: usize, end: usize) -> Option<(Range<usize>, &'a str, usize)> {
        let close = *self.brackets.get(&open)?;
        if close + 1 >= end || self.text.as_bytes()[close + 1] != b'(' {
            return None;
        }
        let url_start = close + 2;
        let url_end = next_at_or_after(&self.parens, url_start)?;
        if url_end >= end {
            return None;
        }
        let url = self.text[url_start..url_end].split_whitespace().next()?;
        Some((open + 1..close, url, url_end + 1))
    }
}

fn run_len(bytes: &[u8], i: usize, marker: u8) -> usize {
    bytes[i..].iter().take_while(|b| **b == marker).count()
}

/// First entry of ascending `sorted` that is `>= from`.
fn next_at_or_after(sorted: &[usize], from: usize) -> Option<usize> {
    sorted.get(sorted.partition_point(|&p| p < from)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_at(text: &str, i: usize) -> Option<(Span<'_>, usize)> {
        Line::new(text).span_at(i, text.len())
    }

    #[test]
    fn emphasis_lengths() {
        assert_eq!(span_at("***hi***", 0), Some((Span::StrongEm(3..5), 8)));
        assert_eq!(span_at("**hi** x", 0), Some((Span::Strong(2..4), 6)));
        assert_eq!(span_at("*hi*", 0), Some((Span::Em(1..3), 4)));
        assert_eq!(span_at("****hi****", 0), None);
    }

    #[test]
    fn nested_emphasis_skips_inner_runs() {
        assert_eq!(span_at("*a **b** c*", 0), Some((Span::Em(1..10), 11)));
    }

    #[test]
    fn whitespace_flanking_blocks_emphasis() {
        assert_eq!(span_at("* a*", 0), None);
        assert_eq!(span_at("*a *", 0), None);
    }

    #[test]
    fn closing_search_skips_code() {
        assert_eq!(span_at("*a `*` b*", 0), Some((Span::Em(1..8), 9)));
    }

    #[test]
    fn code_span_needs_matching_run() {
        assert_eq!(span_at("``a`b``", 0), Some((Span::Code("a`b"), 7)));
        assert_eq!(span_at("`open", 0), None);
    }

    #[test]
    fn strikethrough_needs_two() {
        assert_eq!(span_at("~~gone~~", 0), Some((Span::Del(2..6), 8)));
        assert_eq!(span_at("~x~", 0), None);
    }

    #[test]
    fn image_before_link() {
        assert_eq!(
            span_at("![alt](a.png)", 0),
            Some((
                Span::Image {
                    alt: "alt",
                    url: "a.png"
                },
                13
            ))
        );
    }

    #[test]
    fn link_with_nested_brackets_and_title() {
        assert_eq!(
            span_at("[a [b] c](https://x.y \"t\") tail", 0),
            Some((
                Span::Link {
                    label: 1..8,
                    url: "https://x.y"
                },
                26
            ))
        );
        assert_eq!(span_at("[no url]", 0), None);
    }

    #[test]
    fn spans_stop_at_the_range_end() {
        let text = "*[a* ](u)";
        let line = Line::new(text);
        // Inside the emphasis the bracket's match lies beyond the range.
        assert_eq!(line.span_at(0, text.len()), Some((Span::Em(1..3), 4)));
        assert_eq!(line.span_at(1, 3), None);
    }
}

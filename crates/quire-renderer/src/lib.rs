//! Markdown preview renderer for the quire editor.
//!
//! A small, deterministic markdown-to-HTML transform for the in-app preview.
//! It is not a CommonMark implementation and makes no promise to match the
//! server-side renderer byte for byte. All literal text is HTML-escaped and
//! link/image URLs are scheme-filtered before they reach an attribute.
//!
//! Supported: fenced code, inline code, headings 1-4, blockquotes, horizontal
//! rules, bold+italic / bold / italic / strikethrough, links, images, bullet,
//! ordered and task lists. Anything else renders as a paragraph.

use markdown_weaver_escape::FmtWriter;

mod block;
mod inline;
pub mod render;
pub mod url;
mod writer;


pub use render::ImageResolver;
pub use url::sanitize_url;

use crate::block::parse_blocks;
use crate::writer::PreviewWriter;

/// Render markdown to a preview HTML fragment.
pub fn render_preview(markdown: &str) -> String {
    render_preview_with(markdown, &())
}

/// Render markdown, resolving image sources through `resolver` first.
pub fn render_preview_with<R: ImageResolver>(markdown: &str, resolver: &R) -> String {
    let mut out = String::with_capacity(markdown.len() + markdown.len() / 2);
    if let Err(e) = write_preview_fmt(&mut out, markdown, resolver) {
        tracing::error!(error = %e, "preview render failed");
    }
    out
}

/// Render markdown into any `fmt::Write` sink.
pub fn write_preview_fmt<W, R>(writer: W, markdown: &str, resolver: &R) -> core::fmt::Result
where
    W: core::fmt::Write,
    R: ImageResolver,
{
    let blocks = parse_blocks(markdown);
    PreviewWriter::new(FmtWriter(writer), resolver).run(&blocks)
}

//! HTML output for parsed blocks.

use markdown_weaver_escape::{StrWrite, escape_html};

use crate::block::{Block, ListKind};
use crate::render::ImageResolver;

const HEADING_OPEN: [&str; 4] = ["<h1>", "<h2>", "<h3>", "<h4>"];
const HEADING_CLOSE: [&str; 4] = ["</h1>", "</h2>", "</h3>", "</h4>"];

pub(crate) struct PreviewWriter<'r, W, R> {
    /// Writer to write to.
    pub(crate) writer: W,
    /// Consulted for every image source before sanitizing.
    pub(crate) resolver: &'r R,
}

impl<'r, W, R> PreviewWriter<'r, W, R>
where
    W: StrWrite,
    R: ImageResolver,
{
    pub(crate) fn new(writer: W, resolver: &'r R) -> Self {
        Self { writer, resolver }
    }

    #[inline]
    pub(crate) fn write(&mut self, s: &str) -> Result<(), W::Error> {
        self.writer.write_str(s)
    }

    pub(crate) fn run(mut self, blocks: &[Block<'_>]) -> Result<(), W::Error> {
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                self.write("\n")?;
            }
            self.block(block)?;
        }
        Ok(())
    }

    fn block(&mut self, block: &Block<'_>) -> Result<(), W::Error> {
        match block {
            Block::Code { lang, lines } => {
                match lang {
                    Some(lang) => {
                        self.write("<pre><code class=\"language-")?;
                        escape_html(&mut self.writer, lang)?;
                        self.write("\">")?;
                    }
                    None => self.write("<pre><code>")?,
                }
                for line in lines {
                    escape_html(&mut self.writer, line)?;
                    self.write("\n")?;
                }
                self.write("</code></pre>")
            }
            Block::Heading { level, text } => {
                let idx = (*level).clamp(1, 4) - 1;
                self.write(HEADING_OPEN[idx])?;
                self.inline(text)?;
                self.write(HEADING_CLOSE[idx])
            }
            Block::Quote(lines) => {
                self.write("<blockquote>")?;
                for (i, line) in lines.iter().enumerate() {
                    if i > 0 {
                        self.write("<br>")?;
                    }
                    self.inline(line)?;
                }
                self.write("</blockquote>")
            }
            Block::Rule => self.write("<hr>"),
            Block::List { kind, start, items } => {
                match kind {
                    ListKind::Bullet => self.write("<ul>")?,
                    ListKind::Task => self.write("<ul class=\"task-list\">")?,
                    ListKind::Ordered if *start != 1 => {
                        self.write(&format!("<ol start=\"{start}\">"))?
                    }
                    ListKind::Ordered => self.write("<ol>")?,
                }
                for item in items {
                    match (kind, item.checked) {
                        (ListKind::Task, true) => self.write(
                            "\n<li class=\"task-list-item\"><input type=\"checkbox\" disabled checked> ",
                        )?,
                        (ListKind::Task, false) => self.write(
                            "\n<li class=\"task-list-item\"><input type=\"checkbox\" disabled> ",
                        )?,
                        _ => self.write("\n<li>")?,
                    }
                    self.inline(item.text)?;
                    self.write("</li>")?;
                }
                match kind {
                    ListKind::Ordered => self.write("\n</ol>"),
                    _ => self.write("\n</ul>"),
                }
            }
            Block::Paragraph(text) => {
                self.write("<p>")?;
                self.inline(text)?;
                self.write("</p>")
            }
        }
    }
}

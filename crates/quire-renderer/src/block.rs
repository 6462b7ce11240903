//! Line classification and block grouping.
//!
//! Fenced code is pulled out first so nothing else ever looks inside it.
//! Remaining lines are classified one at a time; consecutive quote lines and
//! consecutive list items of the same kind are grouped into one block.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ListKind {
    Bullet,
    Ordered,
    Task,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ListItem<'a> {
    pub checked: bool,
    pub text: &'a str,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Block<'a> {
    Code {
        lang: Option<&'a str>,
        lines: Vec<&'a str>,
    },
    Heading {
        level: usize,
        text: &'a str,
    },
    Quote(Vec<&'a str>),
    Rule,
    List {
        kind: ListKind,
        start: u64,
        items: Vec<ListItem<'a>>,
    },
    Paragraph(&'a str),
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    Fence(Option<&'a str>),
    Heading(usize, &'a str),
    Quote(&'a str),
    Rule,
    Item {
        kind: ListKind,
        number: u64,
        checked: bool,
        text: &'a str,
    },
    Text(&'a str),
}

pub(crate) fn parse_blocks(markdown: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut lines = markdown.lines();
    // Whether the previous line can be continued by the next quote/list line.
    let mut open_group = false;

    while let Some(line) = lines.next() {
        let joinable = match classify(line) {
            Line::Fence(lang) => {
                let mut body = Vec::new();
                for inner in lines.by_ref() {
                    if is_closing_fence(inner) {
                        break;
                    }
                    body.push(inner);
                }
                blocks.push(Block::Code { lang, lines: body });
                false
            }
            Line::Blank => false,
            Line::Heading(level, text) => {
                blocks.push(Block::Heading { level, text });
                false
            }
            Line::Rule => {
                blocks.push(Block::Rule);
                false
            }
            Line::Text(text) => {
                blocks.push(Block::Paragraph(text));
                false
            }
            Line::Quote(text) => {
                match blocks.last_mut() {
                    Some(Block::Quote(lines)) if open_group => lines.push(text),
                    _ => blocks.push(Block::Quote(vec![text])),
                }
                true
            }
            Line::Item {
                kind,
                number,
                checked,
                text,
            } => {
                let item = ListItem { checked, text };
                match blocks.last_mut() {
                    Some(Block::List {
                        kind: last_kind,
                        items,
                        ..
                    }) if open_group && *last_kind == kind => items.push(item),
                    _ => blocks.push(Block::List {
                        kind,
                        start: number,
                        items: vec![item],
                    }),
                }
                true
            }
        };
        open_group = joinable;
    }
    blocks
}

fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim_start();
    if trimmed.trim_end().is_empty() {
        return Line::Blank;
    }
    if let Some(info) = trimmed.strip_prefix("```") {
        let lang = info.split_whitespace().next();
        return Line::Fence(lang);
    }
    if let Some((level, text)) = heading(trimmed) {
        return Line::Heading(level, text);
    }
    if let Some(rest) = trimmed.strip_prefix('>') {
        let text = rest.strip_prefix(' ').unwrap_or(rest);
        return Line::Quote(text.trim_end());
    }
    if is_rule(trimmed) {
        return Line::Rule;
    }
    if let Some(rest) = strip_bullet(trimmed) {
        if let Some((checked, text)) = task(rest) {
            return Line::Item {
                kind: ListKind::Task,
                number: 1,
                checked,
                text,
            };
        }
        return Line::Item {
            kind: ListKind::Bullet,
            number: 1,
            checked: false,
            text: rest.trim_end(),
        };
    }
    if let Some((number, text)) = ordered(trimmed) {
        return Line::Item {
            kind: ListKind::Ordered,
            number,
            checked: false,
            text,
        };
    }
    Line::Text(line.trim())
}

fn is_closing_fence(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 3 && t.chars().all(|c| c == '`')
}

/// `#` to `####` followed by a space (or nothing).
fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.bytes().take_while(|b| *b == b'#').count();
    if !(1..=4).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    if rest.is_empty() {
        return Some((level, ""));
    }
    rest.strip_prefix([' ', '\t'])
        .map(|text| (level, text.trim()))
}

/// Three or more of the same `-`, `*` or `_`, optionally spaced.
fn is_rule(line: &str) -> bool {
    let mut marks = line.chars().filter(|c| !c.is_whitespace());
    let Some(first) = marks.next() else {
        return false;
    };
    if !matches!(first, '-' | '*' | '_') {
        return false;
    }
    let mut count = 1;
    for c in marks {
        if c != first {
            return false;
        }
        count += 1;
    }
    count >= 3
}

/// Strip a `-`, `*` or `+` bullet marker and the whitespace after it.
fn strip_bullet(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(['-', '*', '+'])?;
    if rest.is_empty() {
        return Some(rest);
    }
    if rest.starts_with([' ', '\t']) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// `[ ]`, `[x]` or `[X]` at the start of a bullet item.
fn task(rest: &str) -> Option<(bool, &str)> {
    let checked = if rest.starts_with("[ ]") {
        false
    } else if rest.starts_with("[x]") || rest.starts_with("[X]") {
        true
    } else {
        return None;
    };
    let after = &rest[3..];
    if after.is_empty() || after.starts_with([' ', '\t']) {
        Some((checked, after.trim()))
    } else {
        None
    }
}

/// `12. text` or `12) text`.
fn ordered(line: &str) -> Option<(u64, &str)> {
    let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || digits > 9 {
        return None;
    }
    let number = line[..digits].parse().ok()?;
    let rest = line[digits..].strip_prefix(['.', ')'])?;
    if rest.is_empty() {
        return Some((number, rest));
    }
    if rest.starts_with([' ', '\t']) {
        Some((number, rest.trim()))
    } else {
        None
    }
}

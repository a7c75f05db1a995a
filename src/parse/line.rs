use crate::model::item::ItemStatus;
use crate::parse::links::is_attachment_line;

/// Columns a tab advances the indentation by
pub const TAB_WIDTH: usize = 4;

/// One classified source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    /// Fence delimiter or fenced content outside any item's detail block
    Code(&'a str),
    Heading { level: usize, text: &'a str },
    Item(ItemLine<'a>),
    /// Indented non-item line belonging to the preceding item
    Detail(&'a str),
    /// Standalone embed such as `![diagram](img/a.png)`
    Attachment(&'a str),
    Plain(&'a str),
}

/// The parts of an item line: `  - [x] body text`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLine<'a> {
    /// Indentation in columns
    pub indent: usize,
    /// Byte offset of the character inside the brackets
    pub marker_offset: usize,
    pub status: ItemStatus,
    pub body: &'a str,
}

/// Indentation width in columns; tabs advance to the next multiple of 4
pub fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += TAB_WIDTH - (width % TAB_WIDTH),
            _ => break,
        }
    }
    width
}

fn leading_ws_bytes(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

/// Parse an item line: optional indent, `-`/`*`/`+`, space, `[c]`, then a
/// space and the body (or end of line).
pub fn parse_item_line(line: &str) -> Option<ItemLine<'_>> {
    let ws = leading_ws_bytes(line);
    let bytes = &line.as_bytes()[ws..];
    if bytes.len() < 5 {
        return None;
    }
    if !matches!(bytes[0], b'-' | b'*' | b'+') || bytes[1] != b' ' || bytes[2] != b'[' {
        return None;
    }
    if bytes[4] != b']' {
        return None;
    }
    let status = ItemStatus::from_marker_char(bytes[3] as char)?;
    let body = match bytes.get(5) {
        None => "",
        Some(b' ') | Some(b'\t') => line[ws + 6..].trim_end(),
        Some(_) => return None,
    };
    Some(ItemLine {
        indent: indent_width(line),
        marker_offset: ws + 3,
        status,
        body,
    })
}

/// Parse an ATX heading (`## Title`), allowing up to 3 leading spaces
pub fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let ws = leading_ws_bytes(line);
    if ws > 3 || line[..ws].contains('\t') {
        return None;
    }
    let rest = &line[ws..];
    let level = rest.len() - rest.trim_start_matches('#').len();
    if level == 0 || level > 6 {
        return None;
    }
    let after = &rest[level..];
    if !after.is_empty() && !after.starts_with(' ') && !after.starts_with('\t') {
        return None;
    }
    let text = after.trim().trim_end_matches('#').trim_end();
    Some((level, text))
}

/// The fence character if this line opens or closes a fenced block
fn fence_char(line: &str) -> Option<char> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some('`')
    } else if trimmed.starts_with("~~~") {
        Some('~')
    } else {
        None
    }
}

/// Rewrite the checkbox marker of an item line for `status`.
///
/// Returns `None` if `line` is not an item line. When the existing marker
/// already spells `status` (e.g. `[X]` for completed) the line is returned
/// unchanged.
pub fn set_marker(line: &str, status: ItemStatus) -> Option<String> {
    let item = parse_item_line(line)?;
    if item.status == status {
        return Some(line.to_string());
    }
    let mut out = String::with_capacity(line.len());
    out.push_str(&line[..item.marker_offset]);
    out.push(status.marker_char());
    out.push_str(&line[item.marker_offset + 1..]);
    Some(out)
}

/// Stateful line classifier: tracks fences and the detail block of the most
/// recent item.
#[derive(Debug, Default)]
pub struct Classifier {
    fence: Option<char>,
    fence_in_detail: bool,
    /// Indent of the item whose detail block is open
    detail_indent: Option<usize>,
}

impl Classifier {
    pub fn new() -> Self {
        Classifier::default()
    }

    pub fn in_fence(&self) -> bool {
        self.fence.is_some()
    }

    pub fn classify<'a>(&mut self, line: &'a str) -> Line<'a> {
        if let Some(open) = self.fence {
            if fence_char(line) == Some(open) {
                self.fence = None;
            }
            return if self.fence_in_detail {
                Line::Detail(line)
            } else {
                Line::Code(line)
            };
        }

        if line.trim().is_empty() {
            self.detail_indent = None;
            return Line::Blank;
        }

        let indent = indent_width(line);

        if let Some(c) = fence_char(line) {
            self.fence = Some(c);
            if self.detail_indent.is_some_and(|di| indent > di) {
                self.fence_in_detail = true;
                return Line::Detail(line);
            }
            self.fence_in_detail = false;
            self.detail_indent = None;
            return Line::Code(line);
        }

        if let Some(item) = parse_item_line(line) {
            self.detail_indent = Some(item.indent);
            return Line::Item(item);
        }

        if let Some(di) = self.detail_indent {
            if indent > di {
                return Line::Detail(line);
            }
            self.detail_indent = None;
        }

        if let Some((level, text)) = parse_heading(line) {
            return Line::Heading { level, text };
        }

        if is_attachment_line(line.trim()) {
            return Line::Attachment(line);
        }

        Line::Plain(line)
    }
}

/// Classify every line of a text, in order
pub fn classify_lines<'a>(lines: &[&'a str]) -> Vec<Line<'a>> {
    let mut classifier = Classifier::new();
    lines.iter().map(|l| classifier.classify(l)).collect()
}

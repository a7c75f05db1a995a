use std::ops::Range;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::model::item::Priority;
use crate::parse::dates::resolve_date_expr;

static DUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@due\(([^)]*)\)|\bdue:(\d{4}-\d{2}-\d{2})\b").unwrap());
static PRIORITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(?:priority|p)\(([^)]*)\)").unwrap());
static BANG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\s)(!{1,3})(?:\s|$)").unwrap());
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(#\p{L}[\p{L}\p{N}_\-/]*)").unwrap());

/// Metadata tokens found in an item's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMeta {
    /// Text with recognized tokens removed and whitespace collapsed
    pub text: String,
    pub due: Option<NaiveDate>,
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
}

/// Extract due-date, priority, and tag tokens from item text.
///
/// Tokens that do not parse (e.g. `@due(someday)`) stay in the display text.
pub fn parse_inline(body: &str, today: NaiveDate) -> InlineMeta {
    let mut remove: Vec<Range<usize>> = Vec::new();

    let mut due = None;
    for caps in DUE_RE.captures_iter(body) {
        let expr = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        if let Some(date) = resolve_date_expr(expr, today) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            if due.is_none() {
                due = Some(date);
            }
            remove.push(whole);
        }
    }

    let mut priority = None;
    for caps in PRIORITY_RE.captures_iter(body) {
        if let Some(p) = caps.get(1).and_then(|m| Priority::parse_priority(m.as_str())) {
            if priority.is_none() {
                priority = Some(p);
            }
            remove.push(caps.get(0).map_or(0..0, |m| m.range()));
        }
    }
    for caps in BANG_RE.captures_iter(body) {
        if let Some(m) = caps.get(1) {
            if priority.is_none() {
                priority = match m.as_str().len() {
                    3 => Some(Priority::High),
                    2 => Some(Priority::Medium),
                    _ => Some(Priority::Low),
                };
            }
            remove.push(m.range());
        }
    }

    let tags = scan_tags(body, &mut remove);

    InlineMeta {
        text: strip_ranges(body, &remove),
        due,
        priority,
        tags,
    }
}

/// Collect `#tag` tokens from free text (deduplicated, in order)
pub fn extract_tags(text: &str) -> Vec<String> {
    let mut ignored = Vec::new();
    scan_tags(text, &mut ignored)
}

fn scan_tags(text: &str, remove: &mut Vec<Range<usize>>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for caps in TAG_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            let tag = m.as_str()[1..].trim_end_matches(['/', '-']).to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
            remove.push(m.range());
        }
    }
    tags
}

/// Remove byte ranges from `s` and collapse the remaining whitespace
fn strip_ranges(s: &str, ranges: &[Range<usize>]) -> String {
    let mut sorted: Vec<&Range<usize>> = ranges.iter().collect();
    sorted.sort_by_key(|r| r.start);
    let mut out = String::with_capacity(s.len());
    let mut pos = 0;
    for r in sorted {
        if r.start < pos {
            pos = pos.max(r.end);
            continue;
        }
        out.push_str(&s[pos..r.start]);
        out.push(' ');
        pos = r.end;
    }
    out.push_str(&s[pos..]);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace, insert, or remove a token matched by `re`, returning the new line.
fn splice_token(line: &str, spans: &[Range<usize>], token: Option<String>) -> String {
    match (spans.first(), token) {
        (Some(first), Some(token)) => {
            let mut out = String::with_capacity(line.len() + token.len());
            out.push_str(&line[..first.start]);
            out.push_str(&token);
            out.push_str(&line[first.end..]);
            out
        }
        (Some(first), None) => {
            // Swallow one separating space before the token
            let start = if line[..first.start].ends_with(' ') {
                first.start - 1
            } else {
                first.start
            };
            let mut out = String::with_capacity(line.len());
            out.push_str(&line[..start]);
            out.push_str(&line[first.end..]);
            out
        }
        (None, Some(token)) => {
            let trimmed = line.trim_end();
            format!("{} {}{}", trimmed, token, &line[trimmed.len()..])
        }
        (None, None) => line.to_string(),
    }
}

/// Set or clear the due-date token on an item line
pub fn set_due_token(line: &str, due: Option<NaiveDate>) -> String {
    let spans: Vec<Range<usize>> = DUE_RE.find_iter(line).map(|m| m.range()).collect();
    let token = due.map(|d| format!("@due({})", d.format("%Y-%m-%d")));
    splice_token(line, &spans, token)
}

/// Set or clear the priority token on an item line
pub fn set_priority_token(line: &str, priority: Option<Priority>) -> String {
    let mut spans: Vec<Range<usize>> = PRIORITY_RE.find_iter(line).map(|m| m.range()).collect();
    spans.extend(
        BANG_RE
            .captures_iter(line)
            .filter_map(|c| c.get(1).map(|m| m.range())),
    );
    spans.sort_by_key(|r| r.start);
    let token = priority.map(|p| format!("@priority({})", p.as_str()));
    splice_token(line, &spans, token)
}

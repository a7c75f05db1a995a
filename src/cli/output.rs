use serde::Serialize;

use crate::io::recovery::RecoveryEntry;
use crate::model::config::RootConfig;
use crate::model::item::{ItemRecord, ItemStatus, Priority};
use crate::ops::scan::ScanReport;
use crate::ops::search::SearchHit;
use crate::ops::sync::SyncOutcome;
use crate::store::{Backlink, IndexStats, TagCount};
use crate::util::unicode::{display_width, pad_to_width, truncate_to_width};

/// Width the item text column is cut to in listings
const TEXT_WIDTH: usize = 72;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ItemDetailJson<'a> {
    #[serde(flatten)]
    pub item: &'a ItemRecord,
    pub children: &'a [ItemRecord],
}

#[derive(Serialize)]
pub struct LinksJson<'a> {
    pub outgoing: &'a [crate::model::document::Link],
    pub backlinks: &'a [Backlink],
}

#[derive(Serialize)]
pub struct RootJson<'a> {
    #[serde(flatten)]
    pub root: &'a RootConfig,
    pub notebook_name: String,
    pub exists: bool,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

pub fn parse_status_arg(s: &str) -> Result<ItemStatus, String> {
    ItemStatus::parse_status(s).ok_or_else(|| {
        format!(
            "unknown status '{}' (expected: pending, in_progress, completed)",
            s
        )
    })
}

/// `none` clears the priority
pub fn parse_priority_arg(s: &str) -> Result<Option<Priority>, String> {
    if s.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    Priority::parse_priority(s)
        .map(Some)
        .ok_or_else(|| format!("unknown priority '{}' (expected: high, medium, low, none)", s))
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

fn tags_suffix(tags: &[String]) -> String {
    if tags.is_empty() {
        String::new()
    } else {
        format!(
            " {}",
            tags.iter()
                .map(|t| format!("#{}", t))
                .collect::<Vec<_>>()
                .join(" ")
        )
    }
}

/// One-line item summary: `[x] 3f2a91c04be71d55 text #tag  (due 2026-10-23)`
pub fn format_item_line(item: &ItemRecord) -> String {
    let mut extras = Vec::new();
    if let Some(due) = item.due {
        extras.push(format!("due {}", due));
    }
    if let Some(p) = item.priority {
        extras.push(p.as_str().to_string());
    }
    let extras = if extras.is_empty() {
        String::new()
    } else {
        format!("  ({})", extras.join(", "))
    };
    format!(
        "[{}] {} {}{}{}",
        item.status.marker_char(),
        item.id,
        truncate_to_width(&item.text, TEXT_WIDTH),
        tags_suffix(&item.tags),
        extras
    )
}

/// Items grouped under `notebook:path` headers
pub fn format_item_listing(items: &[ItemRecord]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<(&str, &str)> = None;
    for item in items {
        let key = (item.notebook.as_str(), item.path.as_str());
        if current != Some(key) {
            if current.is_some() {
                lines.push(String::new());
            }
            lines.push(format!("== {}:{} ==", item.notebook, item.path));
            current = Some(key);
        }
        let indent = " ".repeat(item.indent.min(16));
        lines.push(format!("{}{}", indent, format_item_line(item)));
    }
    lines
}

pub fn format_item_detail(item: &ItemRecord, children: &[ItemRecord]) -> Vec<String> {
    let mut lines = vec![format!("[{}] {} {}", item.status.marker_char(), item.id, item.text)];
    lines.push(format!("file: {}:{} (line {})", item.notebook, item.path, item.line));
    if let Some(section) = &item.section {
        lines.push(format!("section: {}", section));
    }
    if !item.tags.is_empty() {
        lines.push(format!("tags:{}", tags_suffix(&item.tags)));
    }
    if let Some(due) = item.due {
        lines.push(format!("due: {}", due));
    }
    if let Some(p) = item.priority {
        lines.push(format!("priority: {}", p.as_str()));
    }
    if let Some(parent) = &item.parent_id {
        lines.push(format!("parent: {}", parent));
    }
    if let Some(detail) = &item.detail {
        lines.push("detail:".to_string());
        for line in detail.lines() {
            lines.push(format!("  {}", line.trim_start()));
        }
    }
    if !children.is_empty() {
        lines.push(String::new());
        lines.push("children:".to_string());
        let base = item.indent;
        for child in children {
            let depth = child.indent.saturating_sub(base).min(16);
            lines.push(format!("  {}{}", " ".repeat(depth), format_item_line(child)));
        }
    }
    lines
}

pub fn format_outcome(verb: &str, outcome: &SyncOutcome) -> String {
    let mut line = match outcome.line {
        Some(n) => format!("{} {} ({}:{})", verb, outcome.item_id, outcome.document, n),
        None => format!("{} {} ({})", verb, outcome.item_id, outcome.document),
    };
    if outcome.cascaded > 0 {
        line.push_str(&format!(", {} children completed", outcome.cascaded));
    }
    line
}

pub fn format_scan_report(report: &ScanReport) -> Vec<String> {
    let mut lines = vec![format!(
        "indexed {}, removed {}, touched {}, unchanged {}, errors {}",
        report.indexed.len(),
        report.removed.len(),
        report.touched,
        report.unchanged,
        report.errors.len()
    )];
    for doc in &report.indexed {
        lines.push(format!("  + {}", doc));
    }
    for doc in &report.removed {
        lines.push(format!("  - {}", doc));
    }
    for err in &report.errors {
        lines.push(format!("  ! {} ({:?}): {}", err.path.display(), err.kind, err.message));
    }
    if report.embedded > 0 {
        lines.push(format!("embedded {} documents", report.embedded));
    }
    if report.embedding_degraded {
        lines.push("warning: embedding backend failed; vector search is incomplete".to_string());
    }
    lines
}

pub fn format_search_hit(rank: usize, hit: &SearchHit) -> Vec<String> {
    let doc = &hit.document;
    let date = doc.date.map(|d| format!("  {}", d)).unwrap_or_default();
    vec![
        format!(
            "{:>2}. {:.3}  {}:{}  {}{}",
            rank,
            hit.score,
            doc.notebook,
            doc.path,
            doc.title,
            date
        ),
        format!("      {}", hit.snippet),
    ]
}

/// Tags in a column padded to the widest tag
pub fn format_tag_counts(tags: &[TagCount]) -> Vec<String> {
    let width = tags
        .iter()
        .map(|t| display_width(&t.tag) + 1)
        .max()
        .unwrap_or(0);
    tags.iter()
        .map(|t| {
            let name = pad_to_width(&format!("#{}", t.tag), width);
            format!("{}  {} docs, {} items", name, t.documents, t.items)
        })
        .collect()
}

pub fn format_stats(stats: &IndexStats) -> Vec<String> {
    vec![
        format!("documents    {}", stats.documents),
        format!(
            "items        {} ({} pending, {} in progress, {} completed)",
            stats.items, stats.pending, stats.in_progress, stats.completed
        ),
        format!("links        {}", stats.links),
        format!("attachments  {}", stats.attachments),
        format!("embeddings   {}", stats.embeddings),
        format!("schema       v{}", stats.schema_version),
    ]
}

pub fn format_backlink(link: &Backlink) -> String {
    format!("  <- {}:{}  {} (line {})", link.source.notebook, link.source.path, link.source_title, link.line)
}

pub fn format_recovery_entry(entry: &RecoveryEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {}: {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.category,
        entry.description
    )];
    for (k, v) in &entry.fields {
        lines.push(format!("  {}: {}", k, v));
    }
    for line in entry.body.lines() {
        lines.push(format!("  | {}", line));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn item(text: &str) -> ItemRecord {
        ItemRecord {
            id: "0123456789abcdef".into(),
            document_id: 1,
            notebook: "home".into(),
            path: "todo.md".into(),
            text: text.into(),
            raw: format!("- [ ] {}", text),
            status: ItemStatus::Pending,
            due: None,
            priority: None,
            tags: vec![],
            parent_id: None,
            detail: None,
            section: None,
            line: 1,
            indent: 0,
        }
    }

    #[test]
    fn test_format_item_line() {
        let mut it = item("buy milk");
        it.tags = vec!["errand".into()];
        it.due = NaiveDate::from_ymd_opt(2026, 10, 23);
        it.priority = Some(Priority::High);
        assert_eq!(
            format_item_line(&it),
            "[ ] 0123456789abcdef buy milk #errand  (due 2026-10-23, high)"
        );
    }

    #[test]
    fn test_listing_groups_by_document() {
        let a = item("a");
        let mut b = item("b");
        b.path = "other.md".into();
        let lines = format_item_listing(&[a, b]);
        assert_eq!(lines[0], "== home:todo.md ==");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "== home:other.md ==");
    }

    #[test]
    fn test_tag_column_alignment() {
        let tags = vec![
            TagCount {
                tag: "a".into(),
                documents: 1,
                items: 0,
            },
            TagCount {
                tag: "longer".into(),
                documents: 2,
                items: 3,
            },
        ];
        let lines = format_tag_counts(&tags);
        assert_eq!(lines[0], "#a       1 docs, 0 items");
        assert_eq!(lines[1], "#longer  2 docs, 3 items");
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_status_arg("done").unwrap(), ItemStatus::Completed);
        assert!(parse_status_arg("blocked").is_err());
        assert_eq!(parse_priority_arg("none").unwrap(), None);
        assert_eq!(parse_priority_arg("high").unwrap(), Some(Priority::High));
        assert!(parse_priority_arg("urgent").is_err());
    }

    #[test]
    fn test_scan_report_snapshot() {
        let doc = |nb: &str, path: &str| crate::model::document::DocRef {
            notebook: nb.into(),
            path: path.into(),
        };
        let report = ScanReport {
            indexed: vec![doc("home", "todo.md")],
            removed: vec![doc("work", "old.md")],
            touched: 1,
            unchanged: 4,
            ..Default::default()
        };
        insta::assert_snapshot!(format_scan_report(&report).join("\n"), @r"
        indexed 1, removed 1, touched 1, unchanged 4, errors 0
          + home:todo.md
          - work:old.md
        ");
    }
}

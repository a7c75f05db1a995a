use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

/// Entries older than this are dropped by `prune_recovery` without a cutoff.
pub const PRUNE_AGE_DAYS: i64 = 30;

const FILE_HEADER: &str = "\
<!-- quire recovery log
     Content quire could not write back to your notes is kept here.
     View with: qr recovery
     Safe to delete once reviewed. -->

---
";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCategory {
    /// A mutation could not be written to its document
    Write,
    /// An item block was removed from a document
    Delete,
}

impl fmt::Display for RecoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryCategory::Write => write!(f, "write"),
            RecoveryCategory::Delete => write!(f, "delete"),
        }
    }
}

impl RecoveryCategory {
    pub fn parse_category(s: &str) -> Option<Self> {
        match s {
            "write" => Some(RecoveryCategory::Write),
            "delete" => Some(RecoveryCategory::Delete),
            _ => None,
        }
    }
}

/// A single entry in the recovery log.
#[derive(Debug, Clone)]
pub struct RecoveryEntry {
    pub timestamp: DateTime<Utc>,
    pub category: RecoveryCategory,
    pub description: String,
    pub fields: Vec<(String, String)>,
    pub body: String,
}

pub fn recovery_log_path(index_dir: &Path) -> PathBuf {
    index_dir.join("recovery.log")
}

// ---------------------------------------------------------------------------
// Atomic file write
// ---------------------------------------------------------------------------

/// Write `content` to `path` atomically: temp file in the same directory,
/// then rename over the target.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Writing entries
// ---------------------------------------------------------------------------

impl RecoveryEntry {
    fn to_markdown(&self) -> String {
        let mut out = format!(
            "## {} {}: {}\n\n",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.category,
            self.description,
        );
        for (key, value) in &self.fields {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        if !self.body.is_empty() {
            out.push_str("\n```text\n");
            out.push_str(&self.body);
            if !self.body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }
        out.push_str("\n---\n");
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "category": self.category.to_string(),
            "description": self.description,
            "fields": fields,
            "body": self.body,
        })
    }
}

/// Append an entry to the log. Failures are reported through tracing and
/// otherwise ignored.
pub fn log_recovery(index_dir: &Path, entry: RecoveryEntry) {
    if let Err(e) = append_entry(index_dir, &entry) {
        tracing::warn!(error = %e, "could not write to recovery log");
    }
}

fn append_entry(index_dir: &Path, entry: &RecoveryEntry) -> io::Result<()> {
    std::fs::create_dir_all(index_dir)?;
    let path = recovery_log_path(index_dir);
    let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if needs_header {
        file.write_all(FILE_HEADER.as_bytes())?;
    }
    file.write_all(entry.to_markdown().as_bytes())
}

/// Record content that could not be written to `file`
pub fn log_write_failure(index_dir: &Path, file: &Path, item_id: &str, error: &str, content: &str) {
    log_recovery(
        index_dir,
        RecoveryEntry {
            timestamp: Utc::now(),
            category: RecoveryCategory::Write,
            description: format!("write to {} failed", file.display()),
            fields: vec![
                ("File".to_string(), file.display().to_string()),
                ("Item".to_string(), item_id.to_string()),
                ("Error".to_string(), error.to_string()),
            ],
            body: content.to_string(),
        },
    );
}

/// Keep a copy of an item block removed from `file`
pub fn log_item_deletion(index_dir: &Path, file: &Path, item_id: &str, block: &str) {
    log_recovery(
        index_dir,
        RecoveryEntry {
            timestamp: Utc::now(),
            category: RecoveryCategory::Delete,
            description: format!("item {} deleted", item_id),
            fields: vec![
                ("File".to_string(), file.display().to_string()),
                ("Item".to_string(), item_id.to_string()),
            ],
            body: block.to_string(),
        },
    );
}

// ---------------------------------------------------------------------------
// Reading entries
// ---------------------------------------------------------------------------

/// Most recent entries first, at most `limit` of them
pub fn read_recovery_entries(index_dir: &Path, limit: Option<usize>) -> Vec<RecoveryEntry> {
    let Ok(content) = std::fs::read_to_string(recovery_log_path(index_dir)) else {
        return Vec::new();
    };
    let mut entries = parse_entries(&content);
    entries.reverse();
    if let Some(n) = limit {
        entries.truncate(n);
    }
    entries
}

fn parse_entries(content: &str) -> Vec<RecoveryEntry> {
    let mut entries = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let Some((timestamp, category, description)) =
            line.strip_prefix("## ").and_then(parse_entry_header)
        else {
            continue;
        };

        let mut fields = Vec::new();
        let mut body = String::new();
        let mut in_body = false;

        for line in lines.by_ref() {
            if in_body {
                if line == "```" {
                    in_body = false;
                } else {
                    if !body.is_empty() {
                        body.push('\n');
                    }
                    body.push_str(line);
                }
                continue;
            }
            if line == "---" {
                break;
            }
            if line.starts_with("```") {
                in_body = true;
                continue;
            }
            if let Some((key, value)) = line.trim().split_once(": ") {
                fields.push((key.to_string(), value.to_string()));
            }
        }

        entries.push(RecoveryEntry {
            timestamp,
            category,
            description,
            fields,
            body,
        });
    }

    entries
}

/// `<timestamp> <category>: <description>`
fn parse_entry_header(header: &str) -> Option<(DateTime<Utc>, RecoveryCategory, String)> {
    let (ts, rest) = header.split_once(' ')?;
    let timestamp = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
    let (category, description) = rest.split_once(": ")?;
    Some((
        timestamp,
        RecoveryCategory::parse_category(category)?,
        description.to_string(),
    ))
}

// ---------------------------------------------------------------------------
// Pruning
// ---------------------------------------------------------------------------

/// Drop entries older than `before` (default: `PRUNE_AGE_DAYS` ago).
/// Returns the number of entries removed.
pub fn prune_recovery(index_dir: &Path, before: Option<DateTime<Utc>>) -> io::Result<usize> {
    let path = recovery_log_path(index_dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let cutoff = before.unwrap_or_else(|| Utc::now() - chrono::Duration::days(PRUNE_AGE_DAYS));

    let entries = parse_entries(&content);
    let kept: Vec<&RecoveryEntry> = entries.iter().filter(|e| e.timestamp >= cutoff).collect();
    let removed = entries.len() - kept.len();
    if removed == 0 {
        return Ok(0);
    }

    let mut out = String::from(FILE_HEADER);
    for entry in kept {
        out.push_str(&entry.to_markdown());
    }
    atomic_write(&path, out.as_bytes())?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("note.md");
        std::fs::write(&path, "old").unwrap();
        atomic_write(&path, b"new content").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new content");
        // No temp files left behind
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_log_and_read_entries() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(".quire");
        log_write_failure(
            &dir,
            Path::new("/notes/todo.md"),
            "abcd",
            "permission denied",
            "- [x] buy milk\n",
        );
        log_item_deletion(&dir, Path::new("/notes/todo.md"), "ef01", "- [ ] old\n  - [ ] child");

        let entries = read_recovery_entries(&dir, None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].category, RecoveryCategory::Delete);
        assert_eq!(entries[0].body, "- [ ] old\n  - [ ] child");
        assert_eq!(entries[1].category, RecoveryCategory::Write);
        assert_eq!(entries[1].body, "- [x] buy milk");
        assert!(
            entries[1]
                .fields
                .contains(&("Error".to_string(), "permission denied".to_string()))
        );

        let limited = read_recovery_entries(&dir, Some(1));
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].category, RecoveryCategory::Delete);
    }

    #[test]
    fn test_body_with_separator_lines() {
        let tmp = TempDir::new().unwrap();
        log_item_deletion(tmp.path(), Path::new("a.md"), "x", "- [ ] a\n---\n- [ ] b");
        let entries = read_recovery_entries(tmp.path(), None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].body, "- [ ] a\n---\n- [ ] b");
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_recovery_entries(tmp.path(), None).is_empty());
        assert_eq!(prune_recovery(tmp.path(), None).unwrap(), 0);
    }

    #[test]
    fn test_prune_drops_old_entries() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let old = RecoveryEntry {
            timestamp: Utc::now() - chrono::Duration::days(90),
            category: RecoveryCategory::Write,
            description: "old".into(),
            fields: vec![],
            body: String::new(),
        };
        log_recovery(dir, old);
        log_item_deletion(dir, Path::new("a.md"), "x", "- [ ] a");

        assert_eq!(prune_recovery(dir, None).unwrap(), 1);
        let entries = read_recovery_entries(dir, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, RecoveryCategory::Delete);
    }
}

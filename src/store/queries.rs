use chrono::NaiveDate;
use rusqlite::types::{Type, Value};
use rusqlite::{OptionalExtension, Row, params_from_iter};
use serde::Serialize;

use super::documents::{DOCUMENT_COLUMNS, document_from_row};
use super::{IndexStore, StoreError, split_concat};
use crate::model::document::{DocRef, DocumentRecord, Link, LinkKind};
use crate::model::item::{ItemRecord, ItemStatus, Priority};

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Item filters; unset fields do not constrain
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    pub status: Option<ItemStatus>,
    /// Matches the tag and its `/` children
    pub tag: Option<String>,
    pub notebook: Option<String>,
    pub document_id: Option<i64>,
    /// Due on or before this date
    pub due_before: Option<NaiveDate>,
    /// Due on or after this date
    pub due_after: Option<NaiveDate>,
    /// Not completed and due strictly before this date
    pub overdue_as_of: Option<NaiveDate>,
    /// Case-insensitive substring of the display text
    pub text: Option<String>,
    pub limit: Option<usize>,
}

/// Document filters, shared by listing and retrieval
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub notebook: Option<String>,
    pub tag: Option<String>,
    /// Effective date (explicit date, else modification day) on or after
    pub date_from: Option<NaiveDate>,
    /// Effective date on or before
    pub date_to: Option<NaiveDate>,
    /// Also return documents from roots excluded from retrieval
    pub include_excluded: bool,
}

/// Effective document date: explicit date, else the day it was last modified
const EFFECTIVE_DATE: &str = "coalesce(d.date, date(d.mtime_ns / 1000000000, 'unixepoch'))";

fn iso(date: NaiveDate) -> Value {
    Value::Text(date.format("%Y-%m-%d").to_string())
}

fn tag_clause(table: &str, key: &str, owner: &str) -> String {
    format!(
        "EXISTS (SELECT 1 FROM {table} t WHERE t.{key} = {owner} AND (t.tag = ? OR t.tag LIKE ? || '/%'))"
    )
}

impl DocumentQuery {
    pub(super) fn where_clause(&self, values: &mut Vec<Value>) -> String {
        let mut clauses: Vec<String> = vec!["1 = 1".to_string()];
        if !self.include_excluded {
            clauses.push("d.excluded = 0".into());
        }
        if let Some(nb) = &self.notebook {
            clauses.push("d.notebook = ?".into());
            values.push(Value::Text(nb.clone()));
        }
        if let Some(tag) = &self.tag {
            clauses.push(tag_clause("document_tags", "document_id", "d.id"));
            values.push(Value::Text(tag.clone()));
            values.push(Value::Text(tag.clone()));
        }
        if let Some(from) = self.date_from {
            clauses.push(format!("{EFFECTIVE_DATE} >= ?"));
            values.push(iso(from));
        }
        if let Some(to) = self.date_to {
            clauses.push(format!("{EFFECTIVE_DATE} <= ?"));
            values.push(iso(to));
        }
        clauses.join(" AND ")
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A link pointing at a document, with where it comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backlink {
    pub source: DocRef,
    pub source_title: String,
    pub target: String,
    pub label: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub documents: usize,
    pub items: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub schema_version: i64,
    pub documents: usize,
    pub items: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub links: usize,
    pub attachments: usize,
    pub embeddings: usize,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const ITEM_COLUMNS: &str = "i.id, i.document_id, d.notebook, d.path, i.text, i.raw, i.status, i.due,
     i.priority, (SELECT group_concat(tag, char(31)) FROM item_tags t WHERE t.item_id = i.id),
     i.parent_id, i.detail, i.section, i.line, i.indent";

const ITEM_FROM: &str = "FROM items i JOIN documents d ON d.id = i.document_id";

fn bad_value(idx: usize, what: &str, value: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown {} {}", what, value).into(),
    )
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ItemRecord> {
    let status: String = row.get(6)?;
    let due: Option<String> = row.get(7)?;
    let priority: Option<i64> = row.get(8)?;
    let line: i64 = row.get(13)?;
    let indent: i64 = row.get(14)?;
    Ok(ItemRecord {
        id: row.get(0)?,
        document_id: row.get(1)?,
        notebook: row.get(2)?,
        path: row.get(3)?,
        text: row.get(4)?,
        raw: row.get(5)?,
        status: ItemStatus::parse_status(&status).ok_or_else(|| bad_value(6, "status", &status))?,
        due: due.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        priority: match priority {
            Some(rank) => Some(Priority::from_rank(rank).ok_or_else(|| bad_value(8, "priority", rank))?),
            None => None,
        },
        tags: split_concat(row.get(9)?),
        parent_id: row.get(10)?,
        detail: row.get(11)?,
        section: row.get(12)?,
        line: line as usize,
        indent: indent as usize,
    })
}

/// Split a query into FTS5 terms and OR them together. Each term is quoted so
/// user input never reaches the FTS5 query syntax.
pub fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Normalize a link target or document name for backlink matching
fn link_key(target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    let target = target.trim().trim_start_matches("./").replace("%20", " ");
    target.to_lowercase()
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl IndexStore {
    pub fn item(&self, id: &str) -> Result<Option<ItemRecord>, StoreError> {
        let sql = format!("SELECT {ITEM_COLUMNS} {ITEM_FROM} WHERE i.id = ?1");
        Ok(self.conn.query_row(&sql, [id], item_from_row).optional()?)
    }

    /// Items matching every set filter, in document order
    pub fn items(&self, q: &ItemQuery) -> Result<Vec<ItemRecord>, StoreError> {
        let mut clauses: Vec<String> = vec!["1 = 1".to_string()];
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = q.status {
            clauses.push("i.status = ?".into());
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(tag) = &q.tag {
            clauses.push(tag_clause("item_tags", "item_id", "i.id"));
            values.push(Value::Text(tag.clone()));
            values.push(Value::Text(tag.clone()));
        }
        if let Some(nb) = &q.notebook {
            clauses.push("d.notebook = ?".into());
            values.push(Value::Text(nb.clone()));
        }
        if let Some(doc) = q.document_id {
            clauses.push("i.document_id = ?".into());
            values.push(Value::Integer(doc));
        }
        if let Some(before) = q.due_before {
            clauses.push("i.due IS NOT NULL AND i.due <= ?".into());
            values.push(iso(before));
        }
        if let Some(after) = q.due_after {
            clauses.push("i.due IS NOT NULL AND i.due >= ?".into());
            values.push(iso(after));
        }
        if let Some(today) = q.overdue_as_of {
            clauses.push("i.due IS NOT NULL AND i.due < ? AND i.status != 'completed'".into());
            values.push(iso(today));
        }
        if let Some(text) = &q.text {
            clauses.push("lower(i.text) LIKE ?".into());
            values.push(Value::Text(format!("%{}%", text.to_lowercase())));
        }

        let mut sql = format!(
            "SELECT {ITEM_COLUMNS} {ITEM_FROM} WHERE {} ORDER BY d.notebook, d.path, i.position",
            clauses.join(" AND ")
        );
        if let Some(limit) = q.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), item_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All items below `id`, in document order
    pub fn descendants(&self, id: &str) -> Result<Vec<ItemRecord>, StoreError> {
        let sql = format!(
            "WITH RECURSIVE sub(id) AS (
                 SELECT id FROM items WHERE parent_id = ?1
                 UNION ALL
                 SELECT c.id FROM items c JOIN sub ON c.parent_id = sub.id
             )
             SELECT {ITEM_COLUMNS} {ITEM_FROM} WHERE i.id IN (SELECT id FROM sub) ORDER BY i.position"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([id], item_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn documents(&self, q: &DocumentQuery) -> Result<Vec<DocumentRecord>, StoreError> {
        let mut values = Vec::new();
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE {} ORDER BY d.notebook, d.path",
            q.where_clause(&mut values)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), document_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Full-text search. Returns `(document id, relevance)` with relevance
    /// the negated bm25 score (higher is better), best first.
    pub fn fts_search(
        &self,
        query: &str,
        filter: &DocumentQuery,
        limit: usize,
    ) -> Result<Vec<(i64, f64)>, StoreError> {
        let Some(fts) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let mut values = vec![Value::Text(fts)];
        let sql = format!(
            "SELECT d.id, -bm25(documents_fts) AS relevance
             FROM documents_fts JOIN documents d ON d.id = documents_fts.rowid
             WHERE documents_fts MATCH ? AND {}
             ORDER BY relevance DESC
             LIMIT {}",
            filter.where_clause(&mut values),
            limit
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |r| {
            Ok((r.get(0)?, r.get(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn links_from(&self, document_id: i64) -> Result<Vec<Link>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT target, label, kind, external, line FROM links
             WHERE document_id = ?1 ORDER BY line, rowid",
        )?;
        let rows = stmt.query_map([document_id], |r| {
            let kind: String = r.get(2)?;
            let line: i64 = r.get(4)?;
            Ok(Link {
                target: r.get(0)?,
                label: r.get(1)?,
                kind: LinkKind::parse_kind(&kind).ok_or_else(|| bad_value(2, "link kind", &kind))?,
                external: r.get(3)?,
                line: line as usize,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Internal links from other documents whose target names `doc` by path,
    /// path without extension, file stem, or title
    pub fn backlinks(&self, doc: &DocumentRecord) -> Result<Vec<Backlink>, StoreError> {
        let stem_path = doc
            .path
            .rsplit_once('.')
            .map_or(doc.path.as_str(), |(stem, _)| stem);
        let file_stem = stem_path.rsplit('/').next().unwrap_or(stem_path);
        let keys = [
            link_key(&doc.path),
            link_key(stem_path),
            link_key(file_stem),
            link_key(&doc.title),
        ];

        let mut stmt = self.conn.prepare(
            "SELECT d.notebook, d.path, d.title, l.target, l.label, l.line
             FROM links l JOIN documents d ON d.id = l.document_id
             WHERE l.external = 0 AND l.document_id != ?1
             ORDER BY d.notebook, d.path, l.line",
        )?;
        let rows = stmt.query_map([doc.id], |r| {
            let line: i64 = r.get(5)?;
            Ok(Backlink {
                source: DocRef {
                    notebook: r.get(0)?,
                    path: r.get(1)?,
                },
                source_title: r.get(2)?,
                target: r.get(3)?,
                label: r.get(4)?,
                line: line as usize,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            let link = row?;
            let key = link_key(&link.target);
            if !key.is_empty() && keys.contains(&key) {
                out.push(link);
            }
        }
        Ok(out)
    }

    /// Tags with how many documents and items carry them, alphabetically
    pub fn tag_counts(&self) -> Result<Vec<TagCount>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT tag, sum(docs), sum(items) FROM (
                 SELECT tag, 1 AS docs, 0 AS items FROM document_tags
                 UNION ALL
                 SELECT tag, 0, 1 FROM item_tags
             ) GROUP BY tag ORDER BY tag",
        )?;
        let rows = stmt.query_map([], |r| {
            let docs: i64 = r.get(1)?;
            let items: i64 = r.get(2)?;
            Ok(TagCount {
                tag: r.get(0)?,
                documents: docs as usize,
                items: items as usize,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn stats(&self) -> Result<IndexStats, StoreError> {
        let count = |sql: &str| -> Result<usize, StoreError> {
            let n: i64 = self.conn.query_row(sql, [], |r| r.get(0))?;
            Ok(n as usize)
        };
        let mut stats = IndexStats {
            schema_version: self.schema_version()?,
            documents: count("SELECT count(*) FROM documents")?,
            items: count("SELECT count(*) FROM items")?,
            links: count("SELECT count(*) FROM links")?,
            attachments: count("SELECT count(*) FROM attachments")?,
            embeddings: count("SELECT count(*) FROM embeddings")?,
            ..IndexStats::default()
        };

        let mut stmt = self
            .conn
            .prepare("SELECT status, count(*) FROM items GROUP BY status")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        for row in rows {
            let (status, n) = row?;
            match ItemStatus::parse_status(&status) {
                Some(ItemStatus::Pending) => stats.pending = n as usize,
                Some(ItemStatus::InProgress) => stats.in_progress = n as usize,
                Some(ItemStatus::Completed) => stats.completed = n as usize,
                None => {}
            }
        }
        Ok(stats)
    }
}

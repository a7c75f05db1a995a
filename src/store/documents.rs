use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};

use super::{IndexStore, StoreError, split_concat};
use crate::io::fingerprint::Fingerprint;
use crate::model::document::{DocumentRecord, Extraction};

/// Everything needed to (re)index one document
#[derive(Debug, Clone, Copy)]
pub struct DocumentInput<'a> {
    pub notebook: &'a str,
    pub root: &'a Path,
    pub abs_path: &'a Path,
    pub excluded: bool,
    pub read_only: bool,
    pub fingerprint: &'a Fingerprint,
    pub extraction: &'a Extraction,
}

pub(crate) const DOCUMENT_COLUMNS: &str = "d.id, d.notebook, d.path, d.root, d.abs_path, d.title, d.date,
     (SELECT group_concat(tag, char(31)) FROM document_tags t WHERE t.document_id = d.id),
     d.content_hash, d.mtime_ns, d.size, d.excluded, d.read_only";

pub(crate) fn document_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
    let date: Option<String> = row.get(6)?;
    Ok(DocumentRecord {
        id: row.get(0)?,
        notebook: row.get(1)?,
        path: row.get(2)?,
        root: row.get(3)?,
        abs_path: row.get(4)?,
        title: row.get(5)?,
        date: date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        tags: split_concat(row.get(7)?),
        content_hash: row.get(8)?,
        mtime_ns: row.get(9)?,
        size: row.get(10)?,
        excluded: row.get(11)?,
        read_only: row.get(12)?,
    })
}

fn iso(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

impl IndexStore {
    /// Replace everything indexed for one document in a single transaction.
    ///
    /// Children (items, tags, links, attachments) are deleted and rewritten;
    /// the document row keeps its id. Returns the document id.
    pub fn upsert_document(&mut self, input: DocumentInput<'_>) -> Result<i64, StoreError> {
        let ex = input.extraction;
        let doc = &ex.document;
        let fp = input.fingerprint;
        let root = input.root.to_string_lossy();
        let abs_path = input.abs_path.to_string_lossy();
        let tags_text = doc.tags.join(" ");
        let now = Utc::now().to_rfc3339();

        // Take the write lock up front so concurrent writers queue on busy_timeout
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM documents WHERE notebook = ?1 AND path = ?2",
                params![input.notebook, doc.path],
                |r| r.get(0),
            )
            .optional()?;

        let doc_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE documents SET root = ?2, abs_path = ?3, title = ?4, date = ?5,
                         content = ?6, tags_text = ?7, content_hash = ?8, mtime_ns = ?9,
                         size = ?10, indexed_at = ?11, excluded = ?12, read_only = ?13
                     WHERE id = ?1",
                    params![
                        id,
                        root,
                        abs_path,
                        doc.title,
                        iso(doc.date),
                        doc.content,
                        tags_text,
                        fp.content_hash,
                        fp.mtime_ns,
                        fp.size,
                        now,
                        input.excluded,
                        input.read_only,
                    ],
                )?;
                // Items cascade to item_tags and item-owned attachments
                tx.execute("DELETE FROM items WHERE document_id = ?1", [id])?;
                tx.execute("DELETE FROM document_tags WHERE document_id = ?1", [id])?;
                tx.execute("DELETE FROM links WHERE document_id = ?1", [id])?;
                tx.execute("DELETE FROM attachments WHERE document_id = ?1", [id])?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO documents (notebook, path, root, abs_path, title, date, content,
                         tags_text, content_hash, mtime_ns, size, indexed_at, excluded, read_only)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        input.notebook,
                        doc.path,
                        root,
                        abs_path,
                        doc.title,
                        iso(doc.date),
                        doc.content,
                        tags_text,
                        fp.content_hash,
                        fp.mtime_ns,
                        fp.size,
                        now,
                        input.excluded,
                        input.read_only,
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        {
            let mut tag_stmt =
                tx.prepare("INSERT OR IGNORE INTO document_tags (document_id, tag) VALUES (?1, ?2)")?;
            for tag in &doc.tags {
                tag_stmt.execute(params![doc_id, tag])?;
            }

            let mut item_stmt = tx.prepare(
                "INSERT INTO items (id, document_id, parent_id, position, line, indent, status,
                     text, raw, due, priority, section, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            let mut item_tag_stmt =
                tx.prepare("INSERT OR IGNORE INTO item_tags (item_id, tag) VALUES (?1, ?2)")?;
            for (position, item) in ex.items.iter().enumerate() {
                item_stmt.execute(params![
                    item.id,
                    doc_id,
                    item.parent_id,
                    position as i64,
                    item.line as i64,
                    item.indent as i64,
                    item.status.as_str(),
                    item.text,
                    item.raw,
                    iso(item.due),
                    item.priority.map(|p| p.rank()),
                    item.section,
                    item.detail,
                ])?;
                for tag in &item.tags {
                    item_tag_stmt.execute(params![item.id, tag])?;
                }
            }

            let mut link_stmt = tx.prepare(
                "INSERT INTO links (document_id, target, label, kind, external, line)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for link in &ex.links {
                link_stmt.execute(params![
                    doc_id,
                    link.target,
                    link.label,
                    link.kind.as_str(),
                    link.external,
                    link.line as i64,
                ])?;
            }

            let mut att_stmt = tx.prepare(
                "INSERT INTO attachments (document_id, item_id, target, external, copied, line)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for att in &ex.attachments {
                let item_id = att.item.and_then(|i| ex.items.get(i)).map(|i| i.id.as_str());
                att_stmt.execute(params![
                    doc_id,
                    item_id,
                    att.target,
                    att.external,
                    att.copied,
                    att.line as i64,
                ])?;
            }
        }

        tx.commit()?;
        Ok(doc_id)
    }

    /// Record a new fingerprint for a document whose content did not change
    pub fn touch_document(&self, id: i64, fp: &Fingerprint) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE documents SET mtime_ns = ?2, size = ?3, content_hash = ?4 WHERE id = ?1",
            params![id, fp.mtime_ns, fp.size, fp.content_hash],
        )?;
        Ok(())
    }

    /// Remove a document and everything derived from it. Returns false if
    /// there was no such document.
    pub fn delete_document(&self, id: i64) -> Result<bool, StoreError> {
        let n = self.conn.execute("DELETE FROM documents WHERE id = ?1", [id])?;
        Ok(n > 0)
    }

    /// Stored id and fingerprint for a document
    pub fn fingerprint(
        &self,
        notebook: &str,
        path: &str,
    ) -> Result<Option<(i64, Fingerprint)>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, content_hash, mtime_ns, size FROM documents
                 WHERE notebook = ?1 AND path = ?2",
                params![notebook, path],
                |r| {
                    Ok((
                        r.get(0)?,
                        Fingerprint {
                            content_hash: r.get(1)?,
                            mtime_ns: r.get(2)?,
                            size: r.get(3)?,
                        },
                    ))
                },
            )
            .optional()?)
    }

    pub fn document(&self, id: i64) -> Result<Option<DocumentRecord>, StoreError> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.id = ?1");
        Ok(self.conn.query_row(&sql, [id], document_from_row).optional()?)
    }

    pub fn document_by_ref(
        &self,
        notebook: &str,
        path: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.notebook = ?1 AND d.path = ?2"
        );
        Ok(self
            .conn
            .query_row(&sql, params![notebook, path], document_from_row)
            .optional()?)
    }

    pub fn document_by_abs_path(&self, abs: &Path) -> Result<Option<DocumentRecord>, StoreError> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.abs_path = ?1");
        Ok(self
            .conn
            .query_row(&sql, [abs.to_string_lossy()], document_from_row)
            .optional()?)
    }

    /// Every document indexed from `root`, ordered by notebook and path
    pub fn documents_for_root(&self, root: &Path) -> Result<Vec<DocumentRecord>, StoreError> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.root = ?1 ORDER BY d.notebook, d.path"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([root.to_string_lossy()], document_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Raw stored text of a document
    pub fn document_content(&self, id: i64) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT content FROM documents WHERE id = ?1", [id], |r| {
                r.get(0)
            })
            .optional()?)
    }
}

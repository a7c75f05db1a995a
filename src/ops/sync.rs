use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::io::fingerprint;
use crate::io::lock::{LockError, WriteLock};
use crate::io::recovery::{atomic_write, log_item_deletion, log_write_failure};
use crate::model::config::EngineConfig;
use crate::model::document::{DocRef, DocumentRecord, Extraction};
use crate::model::item::{ItemRecord, ItemStatus, Priority};
use crate::ops::notebook::{classify, resolve_document_path, root_for_path};
use crate::parse::frontmatter::split_front_matter;
use crate::parse::identity::normalize;
use crate::parse::inline::{set_due_token, set_priority_token};
use crate::parse::line::indent_width;
use crate::parse::{Classifier, ExtractOptions, Line, extract, item_signature, set_marker};
use crate::store::{DocumentInput, IndexStore, ItemQuery, StoreError};

/// A change to one tracked item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetStatus(ItemStatus),
    /// Completed becomes pending; anything else becomes completed
    Toggle,
    SetDue(Option<NaiveDate>),
    SetPriority(Option<Priority>),
    /// Remove the item with its detail and descendants
    Delete,
    /// Append the item's block to another document
    MoveTo(DocRef),
}

/// Where the item ended up after a mutation
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    /// Identifier after the write; changes when the item moves
    pub item_id: String,
    pub document: DocRef,
    /// 1-based line in the written file; `None` once deleted
    pub line: Option<usize>,
    pub status: Option<ItemStatus>,
    /// Descendants completed along with the item
    pub cascaded: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("item {0} is not in the index; re-scan and retry")]
    StaleIndex(String),
    #[error("could not find the item in {path}; expected a line like {expected:?}")]
    RelocationFailed { path: PathBuf, expected: String },
    #[error("{0} belongs to a read-only root")]
    ReadOnly(PathBuf),
    #[error("no root holds notebook {0}")]
    UnknownTarget(String),
    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not write {path}: {source} (content saved to the recovery log)")]
    Write { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Line model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Item {
        indent: usize,
        signature: String,
    },
    Detail,
    Blank,
    Plain {
        indent: usize,
    },
    /// Front matter, headings, and fenced code: never part of an item block
    Fixed,
}

/// A file split into lines, each classified the way the extractor sees it
struct FileLines {
    lines: Vec<String>,
    kinds: Vec<Kind>,
    newline: &'static str,
    trailing_newline: bool,
}

impl FileLines {
    fn parse(raw: &str) -> FileLines {
        let lines: Vec<&str> = raw.lines().collect();
        let body_start = split_front_matter(&lines).map(|(_, n)| n).unwrap_or(0);
        let mut classifier = Classifier::new();
        let kinds = lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                if i < body_start {
                    return Kind::Fixed;
                }
                match classifier.classify(line) {
                    Line::Item(item) => Kind::Item {
                        indent: item.indent,
                        signature: item_signature(item.body),
                    },
                    Line::Detail(_) => Kind::Detail,
                    Line::Blank => Kind::Blank,
                    Line::Plain(_) | Line::Attachment(_) => Kind::Plain {
                        indent: indent_width(line),
                    },
                    Line::Code(_) | Line::Heading { .. } => Kind::Fixed,
                }
            })
            .collect();
        FileLines {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            kinds,
            newline: if raw.contains("\r\n") { "\r\n" } else { "\n" },
            trailing_newline: raw.ends_with('\n'),
        }
    }

    fn matches(&self, idx: usize, signature: &str) -> bool {
        matches!(self.kinds.get(idx), Some(Kind::Item { signature: s, .. }) if s == signature)
    }

    /// Find the item line: the hint, then outward within `window`, then the
    /// accepted line nearest the hint anywhere in the file.
    fn locate(&self, hint: usize, window: usize, accept: impl Fn(usize) -> bool) -> Option<usize> {
        if accept(hint) {
            return Some(hint);
        }
        for d in 1..=window {
            if let Some(above) = hint.checked_sub(d)
                && accept(above)
            {
                return Some(above);
            }
            if accept(hint + d) {
                return Some(hint + d);
            }
        }
        let found = (0..self.lines.len())
            .filter(|i| accept(*i))
            .min_by_key(|i| i.abs_diff(hint));
        if let Some(i) = found {
            warn!(hint = hint + 1, found = i + 1, "item relocated outside the search window");
        }
        found
    }

    /// End (exclusive) of the block owned by the item at `at`: its detail,
    /// deeper-indented lines and descendants. Trailing blank lines are not
    /// part of the block.
    fn block_end(&self, at: usize) -> usize {
        let Some(Kind::Item { indent: base, .. }) = self.kinds.get(at) else {
            return at + 1;
        };
        let mut end = at + 1;
        for (j, kind) in self.kinds.iter().enumerate().skip(at + 1) {
            match kind {
                Kind::Blank => continue,
                Kind::Detail => end = j + 1,
                Kind::Item { indent, .. } | Kind::Plain { indent } if indent > base => end = j + 1,
                _ => break,
            }
        }
        end
    }

    fn render(&self) -> String {
        let mut out = self.lines.join(self.newline);
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(self.newline);
        }
        out
    }
}

/// Strip the item line's own indentation from every line of its block
fn outdent(block: &[String]) -> Vec<String> {
    let Some(first) = block.first() else {
        return Vec::new();
    };
    let prefix = &first[..first.len() - first.trim_start_matches([' ', '\t']).len()];
    block
        .iter()
        .map(|l| match l.strip_prefix(prefix) {
            Some(rest) => rest.to_string(),
            None => l.trim_start().to_string(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Applies item mutations to the authoritative files and keeps the index in
/// step with the bytes written.
pub struct SyncWriter<'a> {
    config: &'a EngineConfig,
    index_dir: PathBuf,
    today: NaiveDate,
}

/// Resolved destination of a move
struct Target {
    abs: PathBuf,
    root: PathBuf,
    doc: DocRef,
    excluded: bool,
    read_only: bool,
}

impl<'a> SyncWriter<'a> {
    pub fn new(config: &'a EngineConfig, index_dir: impl Into<PathBuf>) -> Self {
        SyncWriter {
            config,
            index_dir: index_dir.into(),
            today: Local::now().date_naive(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Apply `mutation` to the item `item_id`.
    ///
    /// Holds the index write lock for the whole read-modify-write so other
    /// writers cannot interleave.
    #[tracing::instrument(skip(self, store))]
    pub fn apply(
        &self,
        store: &mut IndexStore,
        item_id: &str,
        mutation: Mutation,
    ) -> Result<SyncOutcome, SyncError> {
        let _lock = WriteLock::acquire(
            &self.index_dir,
            Duration::from_millis(self.config.sync.lock_timeout_ms),
        )?;

        let item = store
            .item(item_id)?
            .ok_or_else(|| SyncError::StaleIndex(item_id.to_string()))?;
        let doc = store
            .document(item.document_id)?
            .ok_or_else(|| SyncError::StaleIndex(item_id.to_string()))?;
        let path = PathBuf::from(&doc.abs_path);
        if doc.read_only {
            return Err(SyncError::ReadOnly(path));
        }

        let raw = fs::read_to_string(&path).map_err(|e| SyncError::Read {
            path: path.clone(),
            source: e,
        })?;
        let mut file = FileLines::parse(&raw);
        let fresh = extract(
            &doc.path,
            &raw,
            &ExtractOptions {
                notebook: &doc.notebook,
                today: self.today,
                attachments_dir: &self.config.scan.attachments_dir,
            },
        );
        // A line is the item only if it still hashes to the same identifier
        let by_line: HashMap<usize, usize> = fresh
            .items
            .iter()
            .enumerate()
            .map(|(k, it)| (it.line - 1, k))
            .collect();
        let signature = normalize(&item.text);
        let at = file
            .locate(
                item.line.saturating_sub(1),
                self.config.sync.relocation_window,
                |i| {
                    file.matches(i, &signature)
                        && by_line.get(&i).is_some_and(|k| fresh.items[*k].id == item_id)
                },
            )
            .ok_or_else(|| SyncError::RelocationFailed {
                path: path.clone(),
                expected: item.raw.clone(),
            })?;
        if at + 1 != item.line {
            debug!(from = item.line, to = at + 1, "item moved since last scan");
        }
        let found = by_line[&at];

        let outcome = match mutation {
            Mutation::SetStatus(status) => {
                self.set_status(store, &doc, &mut file, &fresh, found, status)?
            }
            Mutation::Toggle => {
                let current = fresh.items[found].status;
                self.set_status(store, &doc, &mut file, &fresh, found, current.toggled())?
            }
            Mutation::SetDue(due) => {
                file.lines[at] = set_due_token(&file.lines[at], due);
                self.commit(store, &doc, &file, item_id)?;
                self.outcome(store, &doc, at, 0)?
            }
            Mutation::SetPriority(priority) => {
                file.lines[at] = set_priority_token(&file.lines[at], priority);
                self.commit(store, &doc, &file, item_id)?;
                self.outcome(store, &doc, at, 0)?
            }
            Mutation::Delete => self.delete(store, &doc, &mut file, at, &item)?,
            Mutation::MoveTo(target) => self.move_to(store, &doc, &mut file, at, &item, &target)?,
        };
        info!(line = ?outcome.line, cascaded = outcome.cascaded, "mutation applied");
        Ok(outcome)
    }

    /// Set the marker of item `found` and, on completion, of every
    /// descendant the extraction assigns to it.
    fn set_status(
        &self,
        store: &mut IndexStore,
        doc: &DocumentRecord,
        file: &mut FileLines,
        fresh: &Extraction,
        found: usize,
        status: ItemStatus,
    ) -> Result<SyncOutcome, SyncError> {
        let target = &fresh.items[found];
        let at = target.line - 1;
        let mut cascaded = 0;
        if let Some(line) = set_marker(&file.lines[at], status) {
            file.lines[at] = line;
        }
        // Completion flows down to descendants, never up
        if status == ItemStatus::Completed {
            for d in fresh.descendants(found) {
                let child = &fresh.items[d];
                let j = child.line - 1;
                if child.status != ItemStatus::Completed
                    && let Some(line) = set_marker(&file.lines[j], ItemStatus::Completed)
                {
                    file.lines[j] = line;
                    cascaded += 1;
                }
            }
        }
        self.commit(store, doc, file, &target.id)?;
        self.outcome(store, doc, at, cascaded)
    }

    fn delete(
        &self,
        store: &mut IndexStore,
        doc: &DocumentRecord,
        file: &mut FileLines,
        at: usize,
        item: &ItemRecord,
    ) -> Result<SyncOutcome, SyncError> {
        let end = file.block_end(at);
        let removed: Vec<String> = file.lines.drain(at..end).collect();
        file.kinds.drain(at..end);
        log_item_deletion(
            &self.index_dir,
            Path::new(&doc.abs_path),
            &item.id,
            &removed.join("\n"),
        );
        self.commit(store, doc, file, &item.id)?;
        Ok(SyncOutcome {
            item_id: item.id.clone(),
            document: doc.doc_ref(),
            line: None,
            status: None,
            cascaded: 0,
        })
    }

    fn move_to(
        &self,
        store: &mut IndexStore,
        doc: &DocumentRecord,
        file: &mut FileLines,
        at: usize,
        item: &ItemRecord,
        target: &DocRef,
    ) -> Result<SyncOutcome, SyncError> {
        let target = self.resolve_target(store, target)?;
        if target.read_only {
            return Err(SyncError::ReadOnly(target.abs));
        }
        let end = file.block_end(at);
        let block = outdent(&file.lines[at..end]);
        file.lines.drain(at..end);
        file.kinds.drain(at..end);

        let same_file = target.abs == Path::new(&doc.abs_path);
        let mut dest = if same_file {
            FileLines {
                lines: std::mem::take(&mut file.lines),
                kinds: Vec::new(),
                newline: file.newline,
                trailing_newline: true,
            }
        } else if target.abs.exists() {
            let raw = fs::read_to_string(&target.abs).map_err(|e| SyncError::Read {
                path: target.abs.clone(),
                source: e,
            })?;
            FileLines::parse(&raw)
        } else {
            FileLines::parse("")
        };
        dest.trailing_newline = true;
        let new_line = dest.lines.len() + 1;
        dest.lines.extend(block);

        // Target before source; the item is never absent from both files
        self.write(&target.abs, &dest.render(), &item.id)?;
        if !same_file {
            self.write(Path::new(&doc.abs_path), &file.render(), &item.id)?;
            self.reindex(store, doc, Path::new(&doc.abs_path))?;
        }
        let target_doc = DocumentRecord {
            notebook: target.doc.notebook.clone(),
            path: target.doc.path.clone(),
            root: target.root.to_string_lossy().into_owned(),
            abs_path: target.abs.to_string_lossy().into_owned(),
            excluded: target.excluded,
            read_only: target.read_only,
            ..doc.clone()
        };
        self.reindex(store, &target_doc, &target.abs)?;
        self.outcome(store, &target_doc, new_line - 1, 0)
    }

    /// Locate the destination document, or where it would be created
    fn resolve_target(&self, store: &IndexStore, target: &DocRef) -> Result<Target, SyncError> {
        if let Some(existing) = store.document_by_ref(&target.notebook, &target.path)? {
            return Ok(Target {
                abs: PathBuf::from(&existing.abs_path),
                root: PathBuf::from(&existing.root),
                doc: existing.doc_ref(),
                excluded: existing.excluded,
                read_only: existing.read_only,
            });
        }
        let (_, abs) = resolve_document_path(&self.config.roots, &target.notebook, &target.path)
            .ok_or_else(|| SyncError::UnknownTarget(target.notebook.clone()))?;
        // Name the new document the way a scan will
        let (root, rel) = root_for_path(&self.config.roots, &abs)
            .ok_or_else(|| SyncError::UnknownTarget(target.notebook.clone()))?;
        let (notebook, path) = classify(root, &rel);
        Ok(Target {
            abs,
            root: root.path.clone(),
            doc: DocRef { notebook, path },
            excluded: root.exclude_from_retrieval,
            read_only: root.read_only,
        })
    }

    /// Write the file and bring its index entry up to date
    fn commit(
        &self,
        store: &mut IndexStore,
        doc: &DocumentRecord,
        file: &FileLines,
        item_id: &str,
    ) -> Result<(), SyncError> {
        let path = Path::new(&doc.abs_path);
        self.write(path, &file.render(), item_id)?;
        self.reindex(store, doc, path)
    }

    fn write(&self, path: &Path, content: &str, item_id: &str) -> Result<(), SyncError> {
        let result = match path.parent() {
            Some(parent) if !parent.exists() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
        .and_then(|_| atomic_write(path, content.as_bytes()));
        if let Err(e) = result {
            log_write_failure(&self.index_dir, path, item_id, &e.to_string(), content);
            return Err(SyncError::Write {
                path: path.to_path_buf(),
                source: e,
            });
        }
        Ok(())
    }

    /// Re-extract the written file and upsert it, so the stored fingerprint
    /// and line numbers describe the new bytes.
    fn reindex(&self, store: &mut IndexStore, doc: &DocumentRecord, path: &Path) -> Result<(), SyncError> {
        let observed = fingerprint::observe(path).map_err(|e| SyncError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let text = String::from_utf8_lossy(&observed.bytes);
        let extraction = extract(
            &doc.path,
            &text,
            &ExtractOptions {
                notebook: &doc.notebook,
                today: self.today,
                attachments_dir: &self.config.scan.attachments_dir,
            },
        );
        store.upsert_document(DocumentInput {
            notebook: &doc.notebook,
            root: Path::new(&doc.root),
            abs_path: path,
            excluded: doc.excluded,
            read_only: doc.read_only,
            fingerprint: &observed.fingerprint,
            extraction: &extraction,
        })?;
        Ok(())
    }

    /// Read back the item now at line index `at`
    fn outcome(
        &self,
        store: &IndexStore,
        doc: &DocumentRecord,
        at: usize,
        cascaded: usize,
    ) -> Result<SyncOutcome, SyncError> {
        let found = store
            .document_by_ref(&doc.notebook, &doc.path)?
            .map(|d| {
                store.items(&ItemQuery {
                    document_id: Some(d.id),
                    ..Default::default()
                })
            })
            .transpose()?
            .and_then(|items| items.into_iter().find(|i| i.line == at + 1));
        let item = found.ok_or_else(|| SyncError::StaleIndex(format!("{}:{}", doc.doc_ref(), at + 1)))?;
        Ok(SyncOutcome {
            item_id: item.id,
            document: doc.doc_ref(),
            line: Some(item.line),
            status: Some(item.status),
            cascaded,
        })
    }
}

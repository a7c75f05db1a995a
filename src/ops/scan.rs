use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::io::fingerprint::{self, Freshness};
use crate::io::walk::{DocumentWalker, WalkedFile};
use crate::model::config::{EngineConfig, RootConfig};
use crate::model::document::{DocRef, DocumentRecord};
use crate::ops::embed::{BackendError, EmbeddingBackend};
use crate::ops::notebook::{classify, root_for_path};
use crate::parse::{ExtractOptions, extract};
use crate::store::{DocumentInput, IndexStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Re-extract every file regardless of fingerprints
    Full,
    /// Re-extract only files whose content changed
    Incremental,
}

/// Why a single file could not be indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanErrorKind {
    /// Reading or walking failed
    Io,
    /// Content could not be extracted (not UTF-8)
    Parse,
    /// The index rejected the document
    Store,
    /// Another file already maps to the same notebook and path
    Conflict,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub path: PathBuf,
    pub kind: ScanErrorKind,
    pub message: String,
}

impl FileError {
    fn conflict(path: &Path, notebook: &str, rel: &str, owner: &Path) -> FileError {
        warn!(path = %path.display(), owner = %owner.display(), "document key already taken");
        FileError {
            path: path.to_path_buf(),
            kind: ScanErrorKind::Conflict,
            message: format!("{}:{} is already indexed from {}", notebook, rel, owner.display()),
        }
    }
}

/// True when `doc` was indexed from a different file that still exists
fn held_elsewhere(doc: &DocumentRecord, abs: &Path) -> bool {
    let owner = Path::new(&doc.abs_path);
    if owner == abs || !owner.exists() {
        return false;
    }
    match (owner.canonicalize(), abs.canonicalize()) {
        (Ok(a), Ok(b)) => a != b,
        _ => true,
    }
}

/// Errors that abort a scan
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid ignore pattern: {0}")]
    Glob(#[from] globset::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not start scan workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Documents (re)extracted and written to the index
    pub indexed: Vec<DocRef>,
    /// Documents dropped because their file is gone
    pub removed: Vec<DocRef>,
    /// Files whose timestamp moved without a content change
    pub touched: usize,
    pub unchanged: usize,
    /// Documents given a fresh embedding
    pub embedded: usize,
    /// The embedding backend failed; vector retrieval is incomplete
    pub embedding_degraded: bool,
    pub errors: Vec<FileError>,
}

impl ScanReport {
    fn merge(&mut self, other: ScanReport) {
        self.indexed.extend(other.indexed);
        self.removed.extend(other.removed);
        self.touched += other.touched;
        self.unchanged += other.unchanged;
        self.errors.extend(other.errors);
    }
}

enum FileOutcome {
    Indexed(DocRef),
    Touched,
    Unchanged,
}

/// Walks roots and brings the index in line with the files
pub struct Scanner<'a> {
    config: &'a EngineConfig,
    walker: DocumentWalker,
    backend: Option<&'a dyn EmbeddingBackend>,
    today: NaiveDate,
}

impl<'a> Scanner<'a> {
    pub fn new(config: &'a EngineConfig) -> Result<Self, ScanError> {
        let skip = config
            .index
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| vec![p.to_path_buf()])
            .unwrap_or_default();
        Ok(Scanner {
            config,
            walker: DocumentWalker::new(&config.scan, skip)?,
            backend: None,
            today: Local::now().date_naive(),
        })
    }

    /// Embed new and changed documents after each scan
    pub fn with_backend(mut self, backend: &'a dyn EmbeddingBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Reference date for relative due dates
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Scan every configured root.
    #[tracing::instrument(skip_all, fields(mode = ?mode))]
    pub fn scan(&self, store: &mut IndexStore, mode: ScanMode) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::default();
        // (notebook, path) -> the file that holds it in this scan
        let mut claimed: HashMap<(String, String), PathBuf> = HashMap::new();
        for root in &self.config.roots {
            if !root.path.exists() {
                warn!(root = %root.path.display(), "root not found, skipping");
                report.errors.push(FileError {
                    path: root.path.clone(),
                    kind: ScanErrorKind::Io,
                    message: "root not found".into(),
                });
                continue;
            }
            let root_report = self.scan_root(store, root, mode, &mut claimed)?;
            report.merge(root_report);
        }
        self.backfill_embeddings(store, &mut report)?;
        info!(
            indexed = report.indexed.len(),
            removed = report.removed.len(),
            touched = report.touched,
            unchanged = report.unchanged,
            errors = report.errors.len(),
            "scan finished"
        );
        Ok(report)
    }

    fn scan_root(
        &self,
        store: &mut IndexStore,
        root: &RootConfig,
        mode: ScanMode,
        claimed: &mut HashMap<(String, String), PathBuf>,
    ) -> Result<ScanReport, ScanError> {
        let walked = self.walker.walk(root);
        debug!(root = %root.path.display(), files = walked.files.len(), "walked root");

        let mut report = ScanReport::default();
        for (path, message) in walked.errors {
            report.errors.push(FileError {
                path,
                kind: ScanErrorKind::Io,
                message,
            });
        }

        // The first file in walk order keeps a contested key
        let mut files = Vec::with_capacity(walked.files.len());
        for file in walked.files {
            let key = classify(root, &file.rel);
            if let Some(owner) = claimed.get(&key) {
                report
                    .errors
                    .push(FileError::conflict(&file.abs, &key.0, &key.1, owner));
                continue;
            }
            claimed.insert(key, file.abs.clone());
            files.push(file);
        }

        let workers = self.config.index.workers.max(1);
        let db = store.path().map(Path::to_path_buf);
        let outcomes = match db {
            Some(db) if workers > 1 && files.len() > 1 => {
                self.index_parallel(&db, root, &files, mode, workers)?
            }
            _ => files
                .iter()
                .map(|f| self.index_file(store, root, f, mode))
                .collect(),
        };
        for outcome in outcomes {
            match outcome {
                Ok(FileOutcome::Indexed(doc)) => report.indexed.push(doc),
                Ok(FileOutcome::Touched) => report.touched += 1,
                Ok(FileOutcome::Unchanged) => report.unchanged += 1,
                Err(e) => report.errors.push(e),
            }
        }

        // Removal runs on the caller's connection once the workers are done
        let present: HashSet<(String, String)> = files
            .iter()
            .map(|f| classify(root, &f.rel))
            .collect();
        for doc in store.documents_for_root(&root.path)? {
            if !present.contains(&(doc.notebook.clone(), doc.path.clone())) {
                store.delete_document(doc.id)?;
                debug!(doc = %doc.doc_ref(), "removed");
                report.removed.push(doc.doc_ref());
            }
        }
        Ok(report)
    }

    /// Partition files by path hash into disjoint sets; each worker indexes
    /// its set on a private connection.
    fn index_parallel(
        &self,
        db: &Path,
        root: &RootConfig,
        files: &[WalkedFile],
        mode: ScanMode,
        workers: usize,
    ) -> Result<Vec<Result<FileOutcome, FileError>>, ScanError> {
        let mut partitions: Vec<Vec<&WalkedFile>> = vec![Vec::new(); workers];
        for file in files {
            let mut h = DefaultHasher::new();
            file.rel.hash(&mut h);
            partitions[(h.finish() % workers as u64) as usize].push(file);
        }

        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        let results: Vec<Vec<Result<FileOutcome, FileError>>> = pool.install(|| {
            partitions
                .into_par_iter()
                .map(|part| match IndexStore::open(db) {
                    Ok(mut conn) => part
                        .into_iter()
                        .map(|f| self.index_file(&mut conn, root, f, mode))
                        .collect(),
                    Err(e) => part
                        .into_iter()
                        .map(|f| {
                            Err(FileError {
                                path: f.abs.clone(),
                                kind: ScanErrorKind::Store,
                                message: e.to_string(),
                            })
                        })
                        .collect(),
                })
                .collect()
        });
        Ok(results.into_iter().flatten().collect())
    }

    /// Change detection, extraction and upsert for one file
    fn index_file(
        &self,
        store: &mut IndexStore,
        root: &RootConfig,
        file: &WalkedFile,
        mode: ScanMode,
    ) -> Result<FileOutcome, FileError> {
        let fail = |kind: ScanErrorKind, message: String| FileError {
            path: file.abs.clone(),
            kind,
            message,
        };
        let (notebook, path) = classify(root, &file.rel);

        let stored = store
            .fingerprint(&notebook, &path)
            .map_err(|e| fail(ScanErrorKind::Store, e.to_string()))?;
        let freshness = match mode {
            ScanMode::Full => fingerprint::observe(&file.abs).map(Freshness::New),
            ScanMode::Incremental => fingerprint::check(&file.abs, stored.as_ref().map(|(_, fp)| fp)),
        }
        .map_err(|e| fail(ScanErrorKind::Io, e.to_string()))?;

        let observed = match freshness {
            Freshness::Unchanged => return Ok(FileOutcome::Unchanged),
            Freshness::Touched(fp) => {
                if let Some((id, _)) = stored {
                    store
                        .touch_document(id, &fp)
                        .map_err(|e| fail(ScanErrorKind::Store, e.to_string()))?;
                }
                return Ok(FileOutcome::Touched);
            }
            Freshness::Changed(obs) | Freshness::New(obs) => obs,
        };

        let text = String::from_utf8(observed.bytes)
            .map_err(|e| fail(ScanErrorKind::Parse, format!("not valid UTF-8: {}", e)))?;
        let extraction = extract(
            &path,
            &text,
            &ExtractOptions {
                notebook: &notebook,
                today: self.today,
                attachments_dir: &self.config.scan.attachments_dir,
            },
        );
        store
            .upsert_document(DocumentInput {
                notebook: &notebook,
                root: &root.path,
                abs_path: &file.abs,
                excluded: root.exclude_from_retrieval,
                read_only: root.read_only,
                fingerprint: &observed.fingerprint,
                extraction: &extraction,
            })
            .map_err(|e| fail(ScanErrorKind::Store, e.to_string()))?;

        debug!(notebook = %notebook, path = %path, items = extraction.items.len(), "indexed");
        Ok(FileOutcome::Indexed(DocRef { notebook, path }))
    }

    /// Re-index or remove specific files, e.g. paths reported by the watcher.
    /// Paths outside every root, or filtered out by the walker rules, are
    /// ignored.
    #[tracing::instrument(skip_all, fields(paths = paths.len()))]
    pub fn sync_paths(
        &self,
        store: &mut IndexStore,
        paths: &[PathBuf],
    ) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::default();
        for abs in paths {
            let Some((root, rel)) = root_for_path(&self.config.roots, abs) else {
                continue;
            };
            if !self.walker.accepts(&rel, abs) {
                continue;
            }
            let (notebook, path) = classify(root, &rel);
            let existing = store.document_by_ref(&notebook, &path)?;
            if let Some(doc) = &existing
                && held_elsewhere(doc, abs)
            {
                report.errors.push(FileError::conflict(
                    abs,
                    &notebook,
                    &path,
                    Path::new(&doc.abs_path),
                ));
                continue;
            }
            if abs.is_file() {
                let file = WalkedFile {
                    abs: abs.clone(),
                    rel,
                };
                match self.index_file(store, root, &file, ScanMode::Incremental) {
                    Ok(FileOutcome::Indexed(doc)) => report.indexed.push(doc),
                    Ok(FileOutcome::Touched) => report.touched += 1,
                    Ok(FileOutcome::Unchanged) => report.unchanged += 1,
                    Err(e) => report.errors.push(e),
                }
            } else if let Some(doc) = existing {
                store.delete_document(doc.id)?;
                report.removed.push(doc.doc_ref());
            }
        }
        self.backfill_embeddings(store, &mut report)?;
        Ok(report)
    }

    /// Embed documents lacking a current embedding. Backend failures leave
    /// the report marked degraded; they never fail the scan.
    fn backfill_embeddings(
        &self,
        store: &IndexStore,
        report: &mut ScanReport,
    ) -> Result<(), StoreError> {
        let Some(backend) = self.backend else {
            return Ok(());
        };
        let jobs = store.documents_missing_embeddings(backend.model_id())?;
        for batch in jobs.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|j| j.text.as_str()).collect();
            let vectors = match backend.embed(&texts) {
                Ok(v) if v.len() == batch.len() => v,
                Ok(v) => {
                    let err = BackendError::Mismatch {
                        expected: batch.len(),
                        got: v.len(),
                    };
                    warn!(error = %err, "embedding skipped");
                    report.embedding_degraded = true;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "embedding backend failed; vector retrieval degraded");
                    report.embedding_degraded = true;
                    break;
                }
            };
            for (job, vector) in batch.iter().zip(&vectors) {
                store.store_embedding(job.document_id, backend.model_id(), vector, &job.content_hash)?;
                report.embedded += 1;
            }
        }
        Ok(())
    }
}

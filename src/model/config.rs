use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration from quire.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub roots: Vec<RootConfig>,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index database path, relative to the config file's directory
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Scanner worker count; 1 scans on the calling thread
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            path: default_index_path(),
            workers: default_workers(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".quire/index.db")
}

fn default_workers() -> usize {
    1
}

/// What kind of location a root is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootKind {
    /// A notes directory managed by quire; subdirectories become notebooks
    #[default]
    Internal,
    /// A foreign directory indexed as a single notebook
    External,
    /// An individually linked file or directory
    Linked,
}

impl RootKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RootKind::Internal => "internal",
            RootKind::External => "external",
            RootKind::Linked => "linked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub kind: RootKind,
    /// Notebook name (default: the root directory's name)
    #[serde(default)]
    pub notebook: Option<String>,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Keep the root indexed but out of search results
    #[serde(default)]
    pub exclude_from_retrieval: bool,
    /// Never write mutations back into this root
    #[serde(default)]
    pub read_only: bool,
}

impl RootConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RootConfig {
            path: path.into(),
            kind: RootKind::Internal,
            notebook: None,
            recursive: true,
            exclude_from_retrieval: false,
            read_only: false,
        }
    }

    /// The root's own notebook name
    pub fn notebook_name(&self) -> String {
        if let Some(name) = &self.notebook {
            return name.clone();
        }
        let base = if self.path.is_file() {
            self.path.parent().unwrap_or(&self.path)
        } else {
            &self.path
        };
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("default")
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Glob patterns, matched against root-relative paths
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Managed attachment directory name inside each root
    #[serde(default = "default_attachments_dir")]
    pub attachments_dir: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            ignore: Vec::new(),
            extensions: default_extensions(),
            attachments_dir: default_attachments_dir(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["md".into(), "markdown".into(), "txt".into()]
}

fn default_attachments_dir() -> String {
    ".attachments".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Lines searched on each side of a stale line hint
    #[serde(default = "default_relocation_window")]
    pub relocation_window: usize,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            relocation_window: default_relocation_window(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_relocation_window() -> usize {
    50
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    /// Half-life in days for the recency multiplier (absent = no decay)
    #[serde(default)]
    pub recency_half_life_days: Option<f64>,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            lexical_weight: default_lexical_weight(),
            vector_weight: default_vector_weight(),
            recency_half_life_days: None,
            min_score: None,
            limit: default_limit(),
        }
    }
}

fn default_lexical_weight() -> f32 {
    0.3
}

fn default_vector_weight() -> f32 {
    0.7
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Offline feature-hashing embedder
    #[default]
    Hashing,
    /// No vector backend; retrieval is lexical-only
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Documents embedded per backend call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: EmbeddingProvider::default(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_dimensions() -> usize {
    256
}

fn default_batch_size() -> usize {
    32
}

fn default_true() -> bool {
    true
}

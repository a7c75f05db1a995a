use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::{EngineConfig, RootConfig};

pub const CONFIG_FILE: &str = "quire.toml";

/// Error type for configuration loading and editing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no quire.toml found in {0} or any parent directory")]
    NotFound(PathBuf),
    #[error("{0} already exists")]
    AlreadyExists(PathBuf),
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse quire.toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not edit quire.toml: {0}")]
    Edit(#[from] toml_edit::TomlError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A parsed configuration with every path resolved against the directory
/// holding `quire.toml`
#[derive(Debug, Clone)]
pub struct Workspace {
    pub config_path: PathBuf,
    pub base_dir: PathBuf,
    pub config: EngineConfig,
}

impl Workspace {
    pub fn index_path(&self) -> &Path {
        &self.config.index.path
    }

    /// Directory holding the index, the write lock, and the recovery log
    pub fn index_dir(&self) -> PathBuf {
        self.config
            .index
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone())
    }
}

/// Walk up from `start` looking for `quire.toml`.
pub fn discover_config(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !current.pop() {
            return Err(ConfigError::NotFound(start.to_path_buf()));
        }
    }
}

/// Read, resolve, and validate a config file.
pub fn load_config(config_path: &Path) -> Result<Workspace, ConfigError> {
    let text = fs::read_to_string(config_path).map_err(|e| ConfigError::Read {
        path: config_path.to_path_buf(),
        source: e,
    })?;
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = resolve_paths(toml::from_str(&text)?, &base_dir);
    validate(&config)?;
    tracing::debug!(path = %config_path.display(), roots = config.roots.len(), "loaded config");
    Ok(Workspace {
        config_path: config_path.to_path_buf(),
        base_dir,
        config,
    })
}

/// Make relative root and index paths absolute under `base_dir`
pub fn resolve_paths(mut config: EngineConfig, base_dir: &Path) -> EngineConfig {
    let resolve = |p: &Path| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            base_dir.join(p)
        }
    };
    config.index.path = resolve(&config.index.path);
    for root in &mut config.roots {
        root.path = resolve(&root.path);
    }
    config
}

pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    let r = &config.retrieval;
    if r.lexical_weight < 0.0 || r.vector_weight < 0.0 {
        return Err(ConfigError::Invalid(
            "retrieval weights must not be negative".into(),
        ));
    }
    if (r.lexical_weight + r.vector_weight - 1.0).abs() > 1e-3 {
        return Err(ConfigError::Invalid(format!(
            "retrieval weights must sum to 1 (lexical {} + vector {})",
            r.lexical_weight, r.vector_weight
        )));
    }
    if r.recency_half_life_days.is_some_and(|h| h <= 0.0) {
        return Err(ConfigError::Invalid(
            "recency_half_life_days must be positive".into(),
        ));
    }
    if config.index.workers == 0 {
        return Err(ConfigError::Invalid("index.workers must be at least 1".into()));
    }
    if config.embedding.dimensions == 0 || config.embedding.batch_size == 0 {
        return Err(ConfigError::Invalid(
            "embedding dimensions and batch_size must be positive".into(),
        ));
    }
    if config.scan.extensions.is_empty() {
        return Err(ConfigError::Invalid("scan.extensions must not be empty".into()));
    }
    for (i, root) in config.roots.iter().enumerate() {
        if config.roots[..i].iter().any(|other| other.path == root.path) {
            return Err(ConfigError::Invalid(format!(
                "root {} is listed twice",
                root.path.display()
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

const CONFIG_TEMPLATE: &str = r#"# quire configuration

[index]
path = ".quire/index.db"
workers = 1

[scan]
ignore = []
extensions = ["md", "markdown", "txt"]

[retrieval]
lexical_weight = 0.3
vector_weight = 0.7
limit = 10

[embedding]
provider = "hashing"
dimensions = 256
"#;

/// Write a fresh `quire.toml` in `dir` with the given roots
pub fn init_config(dir: &Path, roots: &[RootConfig]) -> Result<PathBuf, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path));
    }
    let mut doc: toml_edit::DocumentMut = CONFIG_TEMPLATE.parse()?;
    for root in roots {
        push_root(&mut doc, root);
    }
    write_doc(&path, &doc)?;
    Ok(path)
}

/// Append a `[[roots]]` entry, preserving the file's existing formatting.
pub fn add_root(config_path: &Path, root: &RootConfig) -> Result<(), ConfigError> {
    let text = fs::read_to_string(config_path).map_err(|e| ConfigError::Read {
        path: config_path.to_path_buf(),
        source: e,
    })?;
    let existing: EngineConfig = toml::from_str(&text)?;
    if existing.roots.iter().any(|r| r.path == root.path) {
        return Err(ConfigError::Invalid(format!(
            "root {} is already configured",
            root.path.display()
        )));
    }
    let mut doc: toml_edit::DocumentMut = text.parse()?;
    push_root(&mut doc, root);
    write_doc(config_path, &doc)
}

fn push_root(doc: &mut toml_edit::DocumentMut, root: &RootConfig) {
    if !doc.contains_key("roots") {
        doc["roots"] = toml_edit::Item::ArrayOfTables(toml_edit::ArrayOfTables::new());
    }
    if let Some(roots) = doc["roots"].as_array_of_tables_mut() {
        let mut table = toml_edit::Table::new();
        table["path"] = toml_edit::value(root.path.to_string_lossy().to_string());
        table["kind"] = toml_edit::value(root.kind.as_str());
        if let Some(name) = &root.notebook {
            table["notebook"] = toml_edit::value(name.as_str());
        }
        if !root.recursive {
            table["recursive"] = toml_edit::value(false);
        }
        if root.exclude_from_retrieval {
            table["exclude_from_retrieval"] = toml_edit::value(true);
        }
        if root.read_only {
            table["read_only"] = toml_edit::value(true);
        }
        roots.push(table);
    }
}

fn write_doc(path: &Path, doc: &toml_edit::DocumentMut) -> Result<(), ConfigError> {
    fs::write(path, doc.to_string()).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::RootKind;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = init_config(tmp.path(), &[RootConfig::new("notes")]).unwrap();
        let ws = load_config(&path).unwrap();
        assert_eq!(ws.config.roots.len(), 1);
        assert_eq!(ws.config.roots[0].path, tmp.path().join("notes"));
        assert_eq!(ws.index_path(), tmp.path().join(".quire/index.db"));
        assert_eq!(ws.index_dir(), tmp.path().join(".quire"));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        init_config(tmp.path(), &[]).unwrap();
        assert!(matches!(
            init_config(tmp.path(), &[]),
            Err(ConfigError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_discover_walks_up() {
        let tmp = TempDir::new().unwrap();
        init_config(tmp.path(), &[]).unwrap();
        let nested = tmp.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(discover_config(&nested).unwrap(), tmp.path().join(CONFIG_FILE));

        let other = TempDir::new().unwrap();
        assert!(matches!(
            discover_config(other.path()),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_root_preserves_comments() {
        let tmp = TempDir::new().unwrap();
        let path = init_config(tmp.path(), &[]).unwrap();
        let root = RootConfig {
            kind: RootKind::External,
            notebook: Some("work".into()),
            read_only: true,
            ..RootConfig::new("/srv/work-notes")
        };
        add_root(&path, &root).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# quire configuration"));
        let ws = load_config(&path).unwrap();
        assert_eq!(ws.config.roots[0].kind, RootKind::External);
        assert_eq!(ws.config.roots[0].notebook.as_deref(), Some("work"));
        assert!(ws.config.roots[0].read_only);

        assert!(matches!(add_root(&path, &root), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, "[retrieval]\nlexical_weight = 0.5\nvector_weight = 0.7\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));

        fs::write(&path, "[retrieval]\nlexical_weight = 1.0\nvector_weight = 0.0\n").unwrap();
        assert!(load_config(&path).is_ok());
    }

    #[test]
    fn test_parse_error_surfaces() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, "[index\npath = 1").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }
}

use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::model::config::{RootConfig, ScanConfig};

/// A candidate document found under a root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub abs: PathBuf,
    /// Path relative to the root's base directory, `/`-separated
    pub rel: String,
}

#[derive(Debug, Default)]
pub struct WalkOutput {
    pub files: Vec<WalkedFile>,
    pub errors: Vec<(PathBuf, String)>,
}

/// Directory that relative document paths are measured from. A root that
/// points at a single file is measured from the file's directory.
pub fn root_base(root: &RootConfig) -> &Path {
    if root.path.is_file() {
        root.path.parent().unwrap_or(&root.path)
    } else {
        &root.path
    }
}

/// `abs` relative to `base` with `/` separators
pub fn rel_path(base: &Path, abs: &Path) -> Option<String> {
    let rel = abs.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(Glob::new(p)?);
    }
    builder.build()
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Applies the ignore globs, extension filter, and hidden/index-dir skips
#[derive(Debug, Clone)]
pub struct DocumentWalker {
    ignore: GlobSet,
    extensions: Vec<String>,
    skip_dirs: Vec<PathBuf>,
}

impl DocumentWalker {
    pub fn new(scan: &ScanConfig, skip_dirs: Vec<PathBuf>) -> Result<Self, globset::Error> {
        Ok(DocumentWalker {
            ignore: build_globset(&scan.ignore)?,
            extensions: scan.extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            skip_dirs,
        })
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }

    /// Whether a file at `abs` (relative path `rel`) is a document to index
    pub fn accepts(&self, rel: &str, abs: &Path) -> bool {
        if self.skip_dirs.iter().any(|d| abs.starts_with(d)) {
            return false;
        }
        if rel.split('/').any(is_hidden) {
            return false;
        }
        self.has_extension(abs) && !self.ignore.is_match(rel)
    }

    /// Collect every document under `root`, sorted by path
    pub fn walk(&self, root: &RootConfig) -> WalkOutput {
        let mut out = WalkOutput::default();
        let base = root_base(root);

        if root.path.is_file() {
            if let Some(rel) = rel_path(base, &root.path)
                && self.has_extension(&root.path)
            {
                out.files.push(WalkedFile {
                    abs: root.path.clone(),
                    rel,
                });
            }
            return out;
        }

        let mut walker = WalkDir::new(&root.path).sort_by_file_name();
        if !root.recursive {
            walker = walker.max_depth(1);
        }

        let entries = walker.into_iter().filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let hidden = entry.file_name().to_str().is_none_or(is_hidden);
            !hidden && !self.skip_dirs.iter().any(|d| entry.path() == d)
        });

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.path.clone());
                    tracing::warn!(path = %path.display(), error = %e, "walk error");
                    out.errors.push((path, e.to_string()));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = rel_path(base, entry.path()) else {
                continue;
            };
            if self.accepts(&rel, entry.path()) {
                out.files.push(WalkedFile {
                    abs: entry.path().to_path_buf(),
                    rel,
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn rels(out: &WalkOutput) -> Vec<&str> {
        out.files.iter().map(|f| f.rel.as_str()).collect()
    }

    #[test]
    fn test_walk_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "b.md");
        touch(root, "a.txt");
        touch(root, "img.png");
        touch(root, "sub/c.markdown");
        touch(root, ".hidden/d.md");
        touch(root, ".quire/e.md");
        touch(root, "drafts/f.md");

        let scan = ScanConfig {
            ignore: vec!["drafts/**".to_string()],
            ..ScanConfig::default()
        };
        let walker = DocumentWalker::new(&scan, vec![root.join(".quire")]).unwrap();
        let out = walker.walk(&RootConfig::new(root));
        assert_eq!(rels(&out), vec!["a.txt", "b.md", "sub/c.markdown"]);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_non_recursive_root() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "top.md");
        touch(tmp.path(), "sub/deep.md");
        let walker = DocumentWalker::new(&ScanConfig::default(), vec![]).unwrap();
        let root = RootConfig {
            recursive: false,
            ..RootConfig::new(tmp.path())
        };
        assert_eq!(rels(&walker.walk(&root)), vec!["top.md"]);
    }

    #[test]
    fn test_single_file_root() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "linked.md");
        let walker = DocumentWalker::new(&ScanConfig::default(), vec![]).unwrap();
        let out = walker.walk(&RootConfig::new(tmp.path().join("linked.md")));
        assert_eq!(rels(&out), vec!["linked.md"]);
    }

    #[test]
    fn test_invalid_glob_is_an_error() {
        let scan = ScanConfig {
            ignore: vec!["[".to_string()],
            ..ScanConfig::default()
        };
        assert!(DocumentWalker::new(&scan, vec![]).is_err());
    }

    #[test]
    fn test_rel_path() {
        assert_eq!(
            rel_path(Path::new("/n"), Path::new("/n/a/b.md")).as_deref(),
            Some("a/b.md")
        );
        assert_eq!(rel_path(Path::new("/n"), Path::new("/other/b.md")), None);
        assert_eq!(rel_path(Path::new("/n"), Path::new("/n")), None);
    }
}

use std::path::{Path, PathBuf};

use crate::io::walk::{rel_path, root_base};
use crate::model::config::{RootConfig, RootKind};

/// Notebook and notebook-relative path for a root-relative document path.
///
/// Documents in a subdirectory of an internal root belong to the notebook
/// named after that subdirectory; everything else belongs to the root's own
/// notebook.
pub fn classify(root: &RootConfig, rel: &str) -> (String, String) {
    if root.kind == RootKind::Internal
        && let Some((first, rest)) = rel.split_once('/')
    {
        return (first.to_string(), rest.to_string());
    }
    (root.notebook_name(), rel.to_string())
}

/// The configured root containing `abs` and the root-relative path.
/// The deepest matching root wins.
pub fn root_for_path<'a>(roots: &'a [RootConfig], abs: &Path) -> Option<(&'a RootConfig, String)> {
    let mut best: Option<(&RootConfig, String)> = None;
    for root in roots {
        let rel = if root.path == abs {
            rel_path(root_base(root), abs)
        } else if abs.starts_with(&root.path) {
            rel_path(&root.path, abs).filter(|rel| root.recursive || !rel.contains('/'))
        } else {
            None
        };
        let Some(rel) = rel else { continue };
        let deeper = best
            .as_ref()
            .is_none_or(|(b, _)| root.path.components().count() > b.path.components().count());
        if deeper {
            best = Some((root, rel));
        }
    }
    best
}

/// Where a document named `notebook`/`path` lives (or would live) on disk
pub fn resolve_document_path<'a>(
    roots: &'a [RootConfig],
    notebook: &str,
    path: &str,
) -> Option<(&'a RootConfig, PathBuf)> {
    let dirs = || roots.iter().filter(|r| !r.path.is_file());
    dirs()
        .find(|r| r.kind == RootKind::Internal && r.path.join(notebook).is_dir())
        .map(|r| (r, r.path.join(notebook).join(path)))
        .or_else(|| {
            dirs()
                .find(|r| r.notebook_name() == notebook)
                .map(|r| (r, r.path.join(path)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_classify_internal_subdirectories() {
        let root = RootConfig::new("/data/notes");
        assert_eq!(classify(&root, "todo.md"), ("notes".into(), "todo.md".into()));
        assert_eq!(
            classify(&root, "work/plans/q4.md"),
            ("work".into(), "plans/q4.md".into())
        );
    }

    #[test]
    fn test_classify_external_root_is_one_notebook() {
        let root = RootConfig {
            kind: RootKind::External,
            notebook: Some("wiki".into()),
            ..RootConfig::new("/srv/wiki")
        };
        assert_eq!(
            classify(&root, "a/b.md"),
            ("wiki".into(), "a/b.md".into())
        );
    }

    #[test]
    fn test_root_for_path_prefers_deepest() {
        let roots = vec![
            RootConfig::new("/data/notes"),
            RootConfig {
                kind: RootKind::External,
                ..RootConfig::new("/data/notes/vendor")
            },
            RootConfig {
                recursive: false,
                ..RootConfig::new("/flat")
            },
        ];
        let (root, rel) = root_for_path(&roots, Path::new("/data/notes/vendor/x.md")).unwrap();
        assert_eq!(root.path, PathBuf::from("/data/notes/vendor"));
        assert_eq!(rel, "x.md");

        let (root, rel) = root_for_path(&roots, Path::new("/data/notes/a/y.md")).unwrap();
        assert_eq!(root.path, PathBuf::from("/data/notes"));
        assert_eq!(rel, "a/y.md");

        assert!(root_for_path(&roots, Path::new("/flat/sub/z.md")).is_none());
        assert!(root_for_path(&roots, Path::new("/elsewhere/z.md")).is_none());
    }

    #[test]
    fn test_resolve_document_path() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("notes/work")).unwrap();
        let roots = vec![RootConfig::new(tmp.path().join("notes"))];

        let (_, p) = resolve_document_path(&roots, "work", "next.md").unwrap();
        assert_eq!(p, tmp.path().join("notes/work/next.md"));

        let (_, p) = resolve_document_path(&roots, "notes", "inbox.md").unwrap();
        assert_eq!(p, tmp.path().join("notes/inbox.md"));

        assert!(resolve_document_path(&roots, "nope", "x.md").is_none());
    }
}

//! SQLite-backed index: a derived, rebuildable projection of the note files.

pub mod documents;
pub mod queries;
pub mod schema;
pub mod vectors;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

pub use documents::DocumentInput;
pub use vectors::EmbeddingJob;
pub use queries::{Backlink, DocumentQuery, IndexStats, ItemQuery, TagCount};
pub use schema::SCHEMA_VERSION;

/// Error type for index operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("index error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("index schema version {found} is newer than this build supports ({supported})")]
    SchemaTooNew { found: i64, supported: i64 },
    #[error("could not create index directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One connection to the index database
pub struct IndexStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl IndexStore {
    /// Open (creating if needed) the index at `path` and migrate it.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let conn = Connection::open(path)?;
        // journal_mode reports the resulting mode as a row
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// A private in-memory index, for tests and one-off runs
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::migrate(&mut conn)?;
        Ok(IndexStore { conn, path })
    }

    /// Database file path; `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        schema::schema_version(&self.conn)
    }
}

/// Split a `group_concat(.., char(31))` column into a sorted list
pub(crate) fn split_concat(value: Option<String>) -> Vec<String> {
    let mut parts: Vec<String> = value
        .unwrap_or_default()
        .split('\u{1f}')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    parts.sort();
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_in_memory_enables_foreign_keys() {
        let store = IndexStore::open_in_memory().unwrap();
        let fk: i64 = store
            .conn()
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fk, 1);
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        assert!(store.path().is_none());
    }

    #[test]
    fn test_open_creates_parent_and_uses_wal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".quire/index.db");
        let store = IndexStore::open(&path).unwrap();
        assert!(path.exists());
        let mode: String = store
            .conn()
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.db");
        drop(IndexStore::open(&path).unwrap());
        let store = IndexStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_too_new_database_fails_to_open() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 5)
                .unwrap();
        }
        assert!(matches!(
            IndexStore::open(&path),
            Err(StoreError::SchemaTooNew { .. })
        ));
    }

    #[test]
    fn test_split_concat() {
        assert_eq!(
            split_concat(Some("b\u{1f}a".to_string())),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(split_concat(None).is_empty());
    }
}

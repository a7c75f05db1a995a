use rusqlite::Connection;

use super::StoreError;

/// Ordered migrations; entry `n` upgrades a database from version `n` to
/// `n + 1`. The schema version lives in `PRAGMA user_version`.
const MIGRATIONS: &[&str] = &[
    // v1: documents and everything extracted from them
    r#"
    CREATE TABLE documents (
        id           INTEGER PRIMARY KEY,
        notebook     TEXT NOT NULL,
        path         TEXT NOT NULL,
        root         TEXT NOT NULL,
        abs_path     TEXT NOT NULL,
        title        TEXT NOT NULL,
        date         TEXT,
        content      TEXT NOT NULL,
        tags_text    TEXT NOT NULL DEFAULT '',
        content_hash TEXT NOT NULL,
        mtime_ns     INTEGER NOT NULL,
        size         INTEGER NOT NULL,
        indexed_at   TEXT NOT NULL,
        excluded     INTEGER NOT NULL DEFAULT 0,
        read_only    INTEGER NOT NULL DEFAULT 0,
        UNIQUE (notebook, path)
    );
    CREATE INDEX idx_documents_root ON documents(root);

    CREATE TABLE document_tags (
        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        tag         TEXT NOT NULL,
        PRIMARY KEY (document_id, tag)
    );
    CREATE INDEX idx_document_tags_tag ON document_tags(tag);

    CREATE TABLE items (
        id          TEXT PRIMARY KEY,
        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        parent_id   TEXT REFERENCES items(id) ON DELETE CASCADE,
        position    INTEGER NOT NULL,
        line        INTEGER NOT NULL,
        indent      INTEGER NOT NULL,
        status      TEXT NOT NULL,
        text        TEXT NOT NULL,
        raw         TEXT NOT NULL,
        due         TEXT,
        priority    INTEGER,
        section     TEXT,
        detail      TEXT
    );
    CREATE INDEX idx_items_document ON items(document_id);
    CREATE INDEX idx_items_parent ON items(parent_id);
    CREATE INDEX idx_items_status ON items(status);
    CREATE INDEX idx_items_due ON items(due);

    CREATE TABLE item_tags (
        item_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        tag     TEXT NOT NULL,
        PRIMARY KEY (item_id, tag)
    );
    CREATE INDEX idx_item_tags_tag ON item_tags(tag);

    CREATE TABLE links (
        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        target      TEXT NOT NULL,
        label       TEXT,
        kind        TEXT NOT NULL,
        external    INTEGER NOT NULL,
        line        INTEGER NOT NULL
    );
    CREATE INDEX idx_links_document ON links(document_id);
    CREATE INDEX idx_links_target ON links(target);

    CREATE TABLE attachments (
        document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        item_id     TEXT REFERENCES items(id) ON DELETE CASCADE,
        target      TEXT NOT NULL,
        external    INTEGER NOT NULL,
        copied      INTEGER NOT NULL,
        line        INTEGER NOT NULL
    );
    CREATE INDEX idx_attachments_document ON attachments(document_id);
    "#,
    // v2: full-text index kept in step with documents by triggers
    r#"
    CREATE VIRTUAL TABLE documents_fts USING fts5(
        title,
        content,
        tags_text,
        content='documents',
        content_rowid='id'
    );

    CREATE TRIGGER documents_fts_ai AFTER INSERT ON documents BEGIN
        INSERT INTO documents_fts(rowid, title, content, tags_text)
        VALUES (new.id, new.title, new.content, new.tags_text);
    END;

    CREATE TRIGGER documents_fts_ad AFTER DELETE ON documents BEGIN
        INSERT INTO documents_fts(documents_fts, rowid, title, content, tags_text)
        VALUES ('delete', old.id, old.title, old.content, old.tags_text);
    END;

    CREATE TRIGGER documents_fts_au AFTER UPDATE OF title, content, tags_text ON documents BEGIN
        INSERT INTO documents_fts(documents_fts, rowid, title, content, tags_text)
        VALUES ('delete', old.id, old.title, old.content, old.tags_text);
        INSERT INTO documents_fts(rowid, title, content, tags_text)
        VALUES (new.id, new.title, new.content, new.tags_text);
    END;

    INSERT INTO documents_fts(documents_fts) VALUES ('rebuild');
    "#,
    // v3: document embeddings for vector retrieval
    r#"
    CREATE TABLE embeddings (
        document_id  INTEGER PRIMARY KEY REFERENCES documents(id) ON DELETE CASCADE,
        model        TEXT NOT NULL,
        dim          INTEGER NOT NULL,
        vector       BLOB NOT NULL,
        content_hash TEXT NOT NULL
    );
    "#,
];

/// Schema version this build reads and writes
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

pub fn schema_version(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the database up to `SCHEMA_VERSION`, one transaction per step.
pub fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    let found = schema_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    for (version, sql) in MIGRATIONS.iter().enumerate().skip(found as usize) {
        let target = version as i64 + 1;
        tracing::info!(from = version, to = target, "migrating index schema");
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", target)?;
        tx.commit()?;
    }
    Ok(())
}

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};

use super::{DocumentQuery, IndexStore, StoreError};

/// A document whose stored embedding is missing or stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingJob {
    pub document_id: i64,
    pub text: String,
    pub content_hash: String,
}

fn encode(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl IndexStore {
    pub fn store_embedding(
        &self,
        document_id: i64,
        model: &str,
        vector: &[f32],
        content_hash: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO embeddings (document_id, model, dim, vector, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(document_id) DO UPDATE SET
                 model = excluded.model, dim = excluded.dim,
                 vector = excluded.vector, content_hash = excluded.content_hash",
            params![
                document_id,
                model,
                vector.len() as i64,
                encode(vector),
                content_hash
            ],
        )?;
        Ok(())
    }

    /// Current embeddings from `model` for documents passing `filter`.
    /// Embeddings computed from older content are skipped.
    pub fn embeddings_for(
        &self,
        filter: &DocumentQuery,
        model: &str,
    ) -> Result<Vec<(i64, Vec<f32>)>, StoreError> {
        let mut values = vec![Value::Text(model.to_string())];
        let sql = format!(
            "SELECT e.document_id, e.vector FROM embeddings e
             JOIN documents d ON d.id = e.document_id
             WHERE e.model = ? AND e.content_hash = d.content_hash AND {}
             ORDER BY e.document_id",
            filter.where_clause(&mut values)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |r| {
            let bytes: Vec<u8> = r.get(1)?;
            Ok((r.get(0)?, decode(&bytes)))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Documents with no embedding from `model` matching their current content
    pub fn documents_missing_embeddings(&self, model: &str) -> Result<Vec<EmbeddingJob>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.title || char(10) || d.content, d.content_hash
             FROM documents d LEFT JOIN embeddings e ON e.document_id = d.id
             WHERE e.document_id IS NULL OR e.model != ?1 OR e.content_hash != d.content_hash
             ORDER BY d.id",
        )?;
        let rows = stmt.query_map([model], |r| {
            Ok(EmbeddingJob {
                document_id: r.get(0)?,
                text: r.get(1)?,
                content_hash: r.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

//! Chunk retrieval and embedding search.

use rusqlite::params;

use super::Database;
use super::models::{ScoredChunk, embedding_from_bytes};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Number of chunks stored for a collection
    pub fn chunk_count(&self, collection_name: &str) -> ServiceResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE collection_name = ?1",
                params![collection_name],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;
        Ok(count as usize)
    }

    /// Search a single collection by embedding similarity.
    ///
    /// Only chunks of `collection_name` are ever scored, so results never
    /// mix documents. Returns at most `limit` chunks, most similar first.
    pub fn search_chunks(
        &self,
        collection_name: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> ServiceResult<Vec<ScoredChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, content, chunk_index, page_number, section_title, embedding
                FROM chunks
                WHERE collection_name = ?1
                "#,
            )
            .map_err(DatabaseError::Query)?;

        let mut results = stmt
            .query_map(params![collection_name], |row| {
                let chunk_index: i64 = row.get(2)?;
                let embedding_bytes: Vec<u8> = row.get(5)?;
                Ok((
                    ScoredChunk {
                        id: row.get(0)?,
                        collection_name: collection_name.to_string(),
                        content: row.get(1)?,
                        chunk_index: chunk_index as usize,
                        page_number: row.get(3)?,
                        section_title: row.get(4)?,
                        similarity: 0.0,
                    },
                    embedding_bytes,
                ))
            })
            .map_err(DatabaseError::Query)?
            .map(|r| {
                r.map(|(mut chunk, bytes)| {
                    chunk.similarity =
                        cosine_similarity(query_embedding, &embedding_from_bytes(&bytes));
                    chunk
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        // Ties resolve by document order
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        results.truncate(limit);

        Ok(results)
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

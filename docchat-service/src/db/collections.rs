//! Collection lifecycle: atomic creation with chunks, listing and deletion.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{Collection, NewChunk, embedding_to_bytes, format_timestamp};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Create a collection and insert all of its chunks in one transaction.
    ///
    /// Either the collection becomes visible with every chunk, or nothing is
    /// written at all.
    pub fn create_collection_with_chunks(
        &self,
        name: &str,
        source_filename: &str,
        embedding_model: &str,
        chunks: &[NewChunk],
    ) -> ServiceResult<Collection> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(DatabaseError::Query)?;

        let dimension = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        let created_at = Utc::now();

        tx.execute(
            r#"
            INSERT INTO collections (name, source_filename, chunk_count, dimension, embedding_model, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                name,
                source_filename,
                chunks.len() as i64,
                dimension as i64,
                embedding_model,
                format_timestamp(&created_at),
            ],
        )
        .map_err(DatabaseError::Query)?;

        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO chunks (id, collection_name, content, chunk_index, total_chunks,
                                        batch_id, page_number, section_title, char_offset, embedding)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                )
                .map_err(DatabaseError::Query)?;

            let total = chunks.len() as i64;
            for chunk in chunks {
                stmt.execute(params![
                    format!("{}_{}", name, chunk.chunk_index),
                    name,
                    chunk.content,
                    chunk.chunk_index as i64,
                    total,
                    chunk.batch_id as i64,
                    chunk.page_number,
                    chunk.section_title,
                    chunk.char_offset as i64,
                    embedding_to_bytes(&chunk.embedding),
                ])
                .map_err(DatabaseError::Query)?;
            }
        }

        tx.commit().map_err(DatabaseError::Query)?;

        Ok(Collection {
            name: name.to_string(),
            source_filename: source_filename.to_string(),
            chunk_count: chunks.len(),
            dimension,
            embedding_model: embedding_model.to_string(),
            created_at,
        })
    }

    /// Check whether a collection exists
    pub fn collection_exists(&self, name: &str) -> ServiceResult<bool> {
        let conn = self.conn()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(DatabaseError::Query)?;
        Ok(exists.is_some())
    }

    /// Get a collection by name
    pub fn get_collection(&self, name: &str) -> ServiceResult<Option<Collection>> {
        let conn = self.conn()?;
        let collection = conn
            .query_row(
                r#"
                SELECT name, source_filename, chunk_count, dimension, embedding_model, created_at
                FROM collections WHERE name = ?1
                "#,
                params![name],
                Collection::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)?;
        Ok(collection)
    }

    /// List all collections, newest first
    pub fn list_collections(&self) -> ServiceResult<Vec<Collection>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT name, source_filename, chunk_count, dimension, embedding_model, created_at
                FROM collections
                ORDER BY created_at DESC
                "#,
            )
            .map_err(DatabaseError::Query)?;

        let collections = stmt
            .query_map([], Collection::from_row)
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok(collections)
    }

    /// Delete a collection and (via cascade) its chunks. Returns whether it existed.
    pub fn delete_collection(&self, name: &str) -> ServiceResult<bool> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM collections WHERE name = ?1", params![name])
            .map_err(DatabaseError::Query)?;
        Ok(deleted > 0)
    }

    /// Names of collections created before `cutoff`
    pub fn collections_created_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM collections WHERE created_at < ?1")
            .map_err(DatabaseError::Query)?;

        let names = stmt
            .query_map(params![format_timestamp(&cutoff)], |row| row.get(0))
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok(names)
    }
}

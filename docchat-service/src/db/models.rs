//! Database model structs.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde::Serialize;

/// An indexed document's vector collection
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub name: String,
    pub source_filename: String,
    pub chunk_count: usize,
    pub dimension: usize,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
}

impl Collection {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let chunk_count: i64 = row.get(2)?;
        let dimension: i64 = row.get(3)?;
        let created_at_str: String = row.get(5)?;

        Ok(Self {
            name: row.get(0)?,
            source_filename: row.get(1)?,
            chunk_count: chunk_count as usize,
            dimension: dimension as usize,
            embedding_model: row.get(4)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

/// A chunk ready to be written, embedding included
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub chunk_index: usize,
    /// Index of the embedding batch the chunk was embedded in
    pub batch_id: usize,
    pub page_number: Option<u32>,
    pub section_title: Option<String>,
    pub char_offset: usize,
    pub embedding: Vec<f32>,
}

/// A chunk returned by similarity search
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub collection_name: String,
    pub content: String,
    pub chunk_index: usize,
    pub page_number: Option<u32>,
    pub section_title: Option<String>,
    pub similarity: f32,
}

/// Fixed-width UTC timestamps so stored values compare correctly as text.
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub(crate) fn embedding_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

//! Database schema migrations.

use rusqlite::Connection;

use crate::error::{DatabaseError, ServiceResult};

/// Run all database migrations.
///
/// Called during database initialization to ensure the schema is up to date.
pub(super) fn run_migrations(conn: &Connection) -> ServiceResult<()> {
    conn.execute_batch(
        r#"
        -- One row per indexed document
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            source_filename TEXT NOT NULL,
            chunk_count INTEGER NOT NULL DEFAULT 0,
            dimension INTEGER NOT NULL DEFAULT 0,
            embedding_model TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        -- Chunks with their embeddings
        -- Embeddings are stored as BLOBs and searched brute-force per collection
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            collection_name TEXT NOT NULL,
            content TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            batch_id INTEGER NOT NULL,
            page_number INTEGER,
            section_title TEXT,
            char_offset INTEGER NOT NULL DEFAULT 0,
            embedding BLOB NOT NULL,
            FOREIGN KEY (collection_name) REFERENCES collections(name) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection_name);

        -- Upload task state (used by the persistent task store)
        CREATE TABLE IF NOT EXISTS tasks (
            task_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            message TEXT NOT NULL,
            progress INTEGER NOT NULL DEFAULT 0,
            collection_name TEXT NOT NULL UNIQUE,
            filename TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_updated ON tasks(updated_at);
    "#,
    )
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    Ok(())
}

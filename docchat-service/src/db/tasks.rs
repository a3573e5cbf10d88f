//! Persistent upload task rows.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use super::Database;
use super::models::{format_timestamp, parse_timestamp};
use crate::error::{DatabaseError, ServiceResult};
use crate::tasks::{TaskState, TaskStatus};

const TASK_COLUMNS: &str =
    "task_id, status, message, progress, collection_name, filename, created_at, updated_at";

fn task_from_row(row: &Row<'_>) -> Result<TaskState, rusqlite::Error> {
    let status_str: String = row.get(1)?;
    let status = TaskStatus::from_str(&status_str)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(1, "status".to_string(), Type::Text))?;
    let progress: i64 = row.get(3)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(TaskState {
        task_id: row.get(0)?,
        status,
        message: row.get(2)?,
        progress: progress.clamp(0, 100) as u8,
        collection_name: row.get(4)?,
        filename: row.get(5)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

impl Database {
    /// Insert a new task row
    pub fn insert_task(&self, task: &TaskState) -> ServiceResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO tasks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                TASK_COLUMNS
            ),
            params![
                task.task_id,
                task.status.as_str(),
                task.message,
                task.progress,
                task.collection_name,
                task.filename,
                format_timestamp(&task.created_at),
                format_timestamp(&task.updated_at),
            ],
        )
        .map_err(DatabaseError::Query)?;
        Ok(())
    }

    /// Get a task by ID
    pub fn get_task(&self, task_id: &str) -> ServiceResult<Option<TaskState>> {
        let conn = self.conn()?;
        let task = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE task_id = ?1", TASK_COLUMNS),
                params![task_id],
                task_from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)?;
        Ok(task)
    }

    /// Get the task that reserved a collection name
    pub fn get_task_by_collection(&self, collection_name: &str) -> ServiceResult<Option<TaskState>> {
        let conn = self.conn()?;
        let task = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE collection_name = ?1", TASK_COLUMNS),
                params![collection_name],
                task_from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)?;
        Ok(task)
    }

    /// Read, mutate and write back one task inside a single transaction.
    ///
    /// `mutate` returns whether it changed the record; unchanged records are
    /// not written. Returns the resulting state and that flag, or `None` if
    /// the task does not exist.
    pub fn update_task_with<F>(
        &self,
        task_id: &str,
        mutate: F,
    ) -> ServiceResult<Option<(TaskState, bool)>>
    where
        F: FnOnce(&mut TaskState) -> bool,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(DatabaseError::Query)?;

        let current = tx
            .query_row(
                &format!("SELECT {} FROM tasks WHERE task_id = ?1", TASK_COLUMNS),
                params![task_id],
                task_from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)?;

        let Some(mut task) = current else {
            return Ok(None);
        };

        let changed = mutate(&mut task);
        if changed {
            tx.execute(
                r#"
                UPDATE tasks SET status = ?2, message = ?3, progress = ?4, updated_at = ?5
                WHERE task_id = ?1
                "#,
                params![
                    task.task_id,
                    task.status.as_str(),
                    task.message,
                    task.progress,
                    format_timestamp(&task.updated_at),
                ],
            )
            .map_err(DatabaseError::Query)?;
        }

        tx.commit().map_err(DatabaseError::Query)?;
        Ok(Some((task, changed)))
    }

    /// Delete terminal tasks last updated before `cutoff`
    pub fn delete_terminal_tasks_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<usize> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM tasks WHERE status IN ('completed', 'failed') AND updated_at < ?1",
                params![format_timestamp(&cutoff)],
            )
            .map_err(DatabaseError::Query)?;
        Ok(deleted)
    }

    /// Delete the task owning a collection
    pub fn delete_task_by_collection(&self, collection_name: &str) -> ServiceResult<bool> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM tasks WHERE collection_name = ?1",
                params![collection_name],
            )
            .map_err(DatabaseError::Query)?;
        Ok(deleted > 0)
    }

    /// Mark every non-terminal task as failed. Returns how many were touched.
    pub fn fail_unfinished_tasks(&self, message: &str) -> ServiceResult<usize> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                r#"
                UPDATE tasks SET status = 'failed', message = ?1, updated_at = ?2
                WHERE status NOT IN ('completed', 'failed')
                "#,
                params![message, format_timestamp(&Utc::now())],
            )
            .map_err(DatabaseError::Query)?;
        Ok(updated)
    }
}

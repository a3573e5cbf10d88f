//! Task table persisted in SQLite.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use super::{TaskState, TaskStore, TaskUpdate, UpdateOutcome};
use crate::db::Database;
use crate::error::ServiceResult;

const INTERRUPTED_MESSAGE: &str = "Processing was interrupted by restart. Please upload the file again.";

/// [`TaskStore`] that survives restarts.
///
/// Every update runs its read-check-write in one transaction while holding
/// the connection mutex. Queries are synchronous and short, so they run
/// inline like the rest of the database layer.
pub struct SqliteTaskStore {
    db: Arc<Database>,
}

impl SqliteTaskStore {
    /// Open the store, failing any task a previous process left unfinished.
    pub fn new(db: Arc<Database>) -> ServiceResult<Self> {
        let interrupted = db.fail_unfinished_tasks(INTERRUPTED_MESSAGE)?;
        if interrupted > 0 {
            warn!(count = interrupted, "Marked interrupted tasks as failed");
        }
        Ok(Self { db })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create(&self, filename: &str, collection_name: &str) -> ServiceResult<TaskState> {
        let state = TaskState::new(Uuid::new_v4().to_string(), filename, collection_name);
        self.db.insert_task(&state)?;
        Ok(state)
    }

    async fn update(
        &self,
        task_id: &str,
        update: TaskUpdate,
    ) -> ServiceResult<Option<UpdateOutcome>> {
        let result = self
            .db
            .update_task_with(task_id, |state| state.apply(&update))?;

        Ok(result.map(|(state, applied)| {
            if applied {
                UpdateOutcome::Applied(state)
            } else {
                UpdateOutcome::Ignored(state)
            }
        }))
    }

    async fn get(&self, task_id: &str) -> ServiceResult<Option<TaskState>> {
        self.db.get_task(task_id)
    }

    async fn find_by_collection(&self, collection_name: &str) -> ServiceResult<Option<TaskState>> {
        self.db.get_task_by_collection(collection_name)
    }

    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<usize> {
        self.db.delete_terminal_tasks_before(cutoff)
    }

    async fn remove_by_collection(&self, collection_name: &str) -> ServiceResult<bool> {
        self.db.delete_task_by_collection(collection_name)
    }
}

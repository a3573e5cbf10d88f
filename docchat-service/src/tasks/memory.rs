//! Process-local task table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{TaskState, TaskStore, TaskUpdate, UpdateOutcome};
use crate::error::ServiceResult;

/// In-memory [`TaskStore`] backed by a sharded concurrent map.
///
/// An update holds the entry's shard write lock for the whole
/// check-and-apply, and reads clone the record under the read lock, so
/// readers never see a half-applied update.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<String, TaskState>,
    /// collection name -> task id
    collections: DashMap<String, String>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, filename: &str, collection_name: &str) -> ServiceResult<TaskState> {
        let task_id = Uuid::new_v4().to_string();
        let state = TaskState::new(task_id.clone(), filename, collection_name);

        self.collections
            .insert(collection_name.to_string(), task_id.clone());
        self.tasks.insert(task_id, state.clone());

        Ok(state)
    }

    async fn update(
        &self,
        task_id: &str,
        update: TaskUpdate,
    ) -> ServiceResult<Option<UpdateOutcome>> {
        let Some(mut entry) = self.tasks.get_mut(task_id) else {
            return Ok(None);
        };

        let outcome = if entry.apply(&update) {
            UpdateOutcome::Applied(entry.clone())
        } else {
            UpdateOutcome::Ignored(entry.clone())
        };

        Ok(Some(outcome))
    }

    async fn get(&self, task_id: &str) -> ServiceResult<Option<TaskState>> {
        Ok(self.tasks.get(task_id).map(|entry| entry.clone()))
    }

    async fn find_by_collection(&self, collection_name: &str) -> ServiceResult<Option<TaskState>> {
        let Some(task_id) = self
            .collections
            .get(collection_name)
            .map(|entry| entry.clone())
        else {
            return Ok(None);
        };
        self.get(&task_id).await
    }

    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<usize> {
        let mut evicted = Vec::new();
        self.tasks.retain(|_, state| {
            let expired = state.status.is_terminal() && state.updated_at < cutoff;
            if expired {
                evicted.push(state.collection_name.clone());
            }
            !expired
        });

        for collection in &evicted {
            self.collections.remove(collection);
        }

        Ok(evicted.len())
    }

    async fn remove_by_collection(&self, collection_name: &str) -> ServiceResult<bool> {
        match self.collections.remove(collection_name) {
            Some((_, task_id)) => Ok(self.tasks.remove(&task_id).is_some()),
            None => Ok(false),
        }
    }
}

//! Upload task tracking.
//!
//! A task follows one upload from receipt to an indexed collection:
//! `queued -> uploading -> processing -> completed | failed`.
//! Storage is behind the [`TaskStore`] trait so the in-memory table can be
//! swapped for the SQLite-backed one when task state must survive restarts.

mod memory;
mod sqlite;

pub use memory::MemoryTaskStore;
pub use sqlite::SqliteTaskStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::ServiceResult;

/// Lifecycle status of an upload task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Uploading => "uploading",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(TaskStatus::Queued),
            "uploading" => Some(TaskStatus::Uploading),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Position in the lifecycle; both terminal states share the last rank.
    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Queued => 0,
            TaskStatus::Uploading => 1,
            TaskStatus::Processing => 2,
            TaskStatus::Completed | TaskStatus::Failed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether a task in `self` may move to `next`.
    ///
    /// Non-terminal states may repeat (progress refresh) or move forward.
    /// Terminal states accept nothing.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub progress: u8,
    /// Collection reserved for this upload. Only queryable once completed.
    pub collection_name: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    pub(crate) fn new(task_id: String, filename: &str, collection_name: &str) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            status: TaskStatus::Queued,
            message: format!("File '{}' queued for processing.", filename),
            progress: 0,
            collection_name: collection_name.to_string(),
            filename: filename.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Collection name as visible to clients.
    pub fn ready_collection(&self) -> Option<&str> {
        (self.status == TaskStatus::Completed).then_some(self.collection_name.as_str())
    }

    /// Apply an update if the transition is legal. Returns whether it was applied.
    pub(crate) fn apply(&mut self, update: &TaskUpdate) -> bool {
        if !self.status.can_transition_to(update.status) {
            return false;
        }

        self.status = update.status;
        self.message = update.message.clone();
        self.progress = match update.status {
            TaskStatus::Completed => 100,
            // Failure keeps the progress reached so far
            TaskStatus::Failed => self.progress,
            _ => update.progress.min(100).max(self.progress),
        };
        self.updated_at = Utc::now();
        true
    }
}

/// Requested change to a task
#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub status: TaskStatus,
    pub message: String,
    pub progress: u8,
}

impl TaskUpdate {
    pub fn new(status: TaskStatus, message: impl Into<String>, progress: u8) -> Self {
        Self {
            status,
            message: message.into(),
            progress,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(TaskStatus::Failed, message, 0)
    }
}

/// Result of [`TaskStore::update`]
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The update was applied; carries the new state.
    Applied(TaskState),
    /// The update was rejected (terminal or backward); carries the unchanged state.
    Ignored(TaskState),
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }

    /// The task as stored after the update attempt
    pub fn state(&self) -> &TaskState {
        match self {
            UpdateOutcome::Applied(state) | UpdateOutcome::Ignored(state) => state,
        }
    }
}

/// Storage for task state.
///
/// Implementations must serialize mutation per task so that a concurrent
/// `get` observes either the previous or the fully applied next record.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a new `queued` task owning `collection_name`.
    async fn create(&self, filename: &str, collection_name: &str) -> ServiceResult<TaskState>;

    /// Apply a status update. `Ok(None)` if the task does not exist.
    async fn update(&self, task_id: &str, update: TaskUpdate)
    -> ServiceResult<Option<UpdateOutcome>>;

    async fn get(&self, task_id: &str) -> ServiceResult<Option<TaskState>>;

    /// Task that owns a collection name, if still tracked.
    async fn find_by_collection(&self, collection_name: &str) -> ServiceResult<Option<TaskState>>;

    /// Whether any tracked task has reserved this collection name.
    async fn collection_reserved(&self, collection_name: &str) -> ServiceResult<bool> {
        Ok(self.find_by_collection(collection_name).await?.is_some())
    }

    /// Drop terminal tasks last updated before `cutoff`. Returns how many were removed.
    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<usize>;

    /// Forget the task owning a collection (after the collection is deleted).
    async fn remove_by_collection(&self, collection_name: &str) -> ServiceResult<bool>;
}

/// Fan-out of applied task updates for push-style status delivery.
#[derive(Clone)]
pub struct TaskEvents {
    tx: broadcast::Sender<TaskState>,
}

impl Default for TaskEvents {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TaskEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, state: &TaskState) {
        // No subscribers is the common case
        if self.tx.send(state.clone()).is_ok() {
            debug!(task_id = %state.task_id, status = %state.status, "Published task update");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use TaskStatus::*;
        assert!(Queued.can_transition_to(Uploading));
        assert!(Queued.can_transition_to(Processing));
        assert!(Uploading.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Queued.can_transition_to(Failed));
        assert!(Uploading.can_transition_to(Failed));
    }

    #[test]
    fn test_backward_and_terminal_transitions_rejected() {
        use TaskStatus::*;
        assert!(!Processing.can_transition_to(Uploading));
        assert!(!Uploading.can_transition_to(Queued));
        for next in [Queued, Uploading, Processing, Completed, Failed] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_apply_keeps_progress_on_failure() {
        let mut state = TaskState::new("t1".to_string(), "a.pdf", "doc_00000001");
        assert!(state.apply(&TaskUpdate::new(TaskStatus::Processing, "Embedding", 60)));
        assert!(state.apply(&TaskUpdate::failed("Embedding service unreachable")));
        assert_eq!(state.status, TaskStatus::Failed);
        assert_eq!(state.progress, 60);
        assert_eq!(state.message, "Embedding service unreachable");
    }

    #[test]
    fn test_apply_progress_never_decreases() {
        let mut state = TaskState::new("t1".to_string(), "a.pdf", "doc_00000001");
        state.apply(&TaskUpdate::new(TaskStatus::Processing, "step", 40));
        state.apply(&TaskUpdate::new(TaskStatus::Processing, "step", 25));
        assert_eq!(state.progress, 40);
        state.apply(&TaskUpdate::new(TaskStatus::Processing, "step", 250));
        assert_eq!(state.progress, 100);
    }

    #[test]
    fn test_completed_sets_full_progress_and_exposes_collection() {
        let mut state = TaskState::new("t1".to_string(), "a.pdf", "doc_00000001");
        assert_eq!(state.ready_collection(), None);
        state.apply(&TaskUpdate::new(TaskStatus::Completed, "done", 0));
        assert_eq!(state.progress, 100);
        assert_eq!(state.ready_collection(), Some("doc_00000001"));
        assert!(!state.apply(&TaskUpdate::failed("late failure")));
        assert_eq!(state.status, TaskStatus::Completed);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            TaskStatus::Queued,
            TaskStatus::Uploading,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("bogus"), None);
    }
}

//! Task progress updates and their fan-out.

use tracing::{debug, warn};

use crate::error::ServiceResult;
use crate::service::DocChatService;
use crate::tasks::{TaskStatus, TaskUpdate};

/// Pipeline checkpoints as progress percentages
pub(crate) mod checkpoints {
    pub const SAVING: u8 = 10;
    pub const EXTRACTING: u8 = 25;
    pub const CHUNKING: u8 = 40;
    /// Embedding spans `CHUNKING..EMBEDDED` across batches
    pub const EMBEDDED: u8 = 90;
    pub const STORING: u8 = 95;
}

impl DocChatService {
    /// Apply an update to a task and publish the new state if it took effect.
    pub(crate) async fn report_progress(
        &self,
        task_id: &str,
        update: TaskUpdate,
    ) -> ServiceResult<()> {
        let status = update.status;
        let Some(outcome) = self.tasks.update(task_id, update).await? else {
            warn!(task_id, "Progress reported for unknown task");
            return Ok(());
        };

        let state = outcome.state();
        if outcome.is_applied() {
            debug!(
                task_id,
                status = %state.status,
                progress = state.progress,
                message = %state.message,
                "Task progress"
            );
            self.events.publish(state);
        } else {
            debug!(task_id, requested = %status, current = %state.status, "Ignored task update");
        }
        Ok(())
    }

    /// Record a step of the `processing` phase.
    pub(crate) async fn report_processing(
        &self,
        task_id: &str,
        message: impl Into<String>,
        progress: u8,
    ) -> ServiceResult<()> {
        self.report_progress(
            task_id,
            TaskUpdate::new(TaskStatus::Processing, message, progress),
        )
        .await
    }
}

/// Progress after `done` of `total` embedding batches.
pub(crate) fn embedding_progress(done: usize, total: usize) -> u8 {
    use checkpoints::{CHUNKING, EMBEDDED};

    if total == 0 {
        return EMBEDDED;
    }
    let span = (EMBEDDED - CHUNKING) as usize;
    CHUNKING + (span * done.min(total) / total) as u8
}

//! Push-style task status delivery.

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::error::ServiceResult;
use crate::service::DocChatService;
use crate::tasks::TaskState;

impl DocChatService {
    /// Stream the state of one task: its current state first, then every
    /// applied update, ending after the terminal one.
    pub async fn task_event_stream(
        &self,
        task_id: &str,
    ) -> ServiceResult<BoxStream<'static, TaskState>> {
        // Subscribe before reading so no update falls between the two
        let mut rx = self.events.subscribe();
        let current = self.task_status(task_id).await?;
        let tasks = self.tasks.clone();
        let task_id = task_id.to_string();

        let stream = async_stream::stream! {
            let mut last = current.clone();
            yield current;
            if last.status.is_terminal() {
                return;
            }

            loop {
                let next = match rx.recv().await {
                    Ok(state) if state.task_id == task_id => state,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(task_id = %task_id, skipped, "Event stream lagged, re-reading task");
                        match tasks.get(&task_id).await {
                            Ok(Some(state)) => state,
                            _ => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                };

                if next == last {
                    continue;
                }
                let terminal = next.status.is_terminal();
                last = next.clone();
                yield next;
                if terminal {
                    break;
                }
            }
        };

        Ok(stream.boxed())
    }
}

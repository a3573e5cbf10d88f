//! Service coordinator tying tasks, extraction, indexing and chat together.

mod chat;
mod document_processing;
mod events;
mod retention;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::chunking::TextSplitter;
use crate::config::AppConfig;
use crate::db::{Collection, Database};
use crate::error::{ServiceError, ServiceResult};
use crate::provider::Providers;
use crate::tasks::{TaskEvents, TaskState, TaskStore};

/// Main service coordinator
pub struct DocChatService {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    pub tasks: Arc<dyn TaskStore>,
    pub events: TaskEvents,
    pub providers: Providers,
    pub started_at: Instant,
}

impl DocChatService {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<Database>,
        tasks: Arc<dyn TaskStore>,
        providers: Providers,
    ) -> Self {
        info!(
            generation_model = providers.chat.model_name(),
            embedding_model = providers.embeddings.model_name(),
            "Initializing DocChat service"
        );

        Self {
            config,
            db,
            tasks,
            events: TaskEvents::default(),
            providers,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn splitter(&self) -> TextSplitter {
        TextSplitter::new(
            self.config.embeddings.chunk_size,
            self.config.embeddings.chunk_overlap,
        )
    }

    /// Directory holding the original upload of a collection
    pub(crate) fn originals_dir(&self, collection_name: &str) -> PathBuf {
        self.config
            .storage
            .data_dir
            .join("documents")
            .join(collection_name)
    }

    /// Current state of a task
    pub async fn task_status(&self, task_id: &str) -> ServiceResult<TaskState> {
        self.tasks
            .get(task_id)
            .await?
            .ok_or_else(|| ServiceError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// All indexed collections, newest first
    pub fn list_collections(&self) -> ServiceResult<Vec<Collection>> {
        self.db.list_collections()
    }

    /// Delete a collection, its chunks, its original file and the task that produced it.
    pub async fn delete_collection(&self, collection_name: &str) -> ServiceResult<()> {
        if !self.db.delete_collection(collection_name)? {
            return Err(ServiceError::CollectionNotFound {
                collection_name: collection_name.to_string(),
            });
        }

        self.tasks.remove_by_collection(collection_name).await?;
        self.remove_originals(collection_name).await;

        info!(collection = %collection_name, "Deleted collection");
        Ok(())
    }

    pub(crate) async fn remove_originals(&self, collection_name: &str) {
        let dir = self.originals_dir(collection_name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to remove original upload");
            }
        }
    }

    /// Whether the generation model answers its health probe
    pub async fn llm_available(&self) -> bool {
        self.providers.chat.health_check().await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::provider::fake::FakeProviders;
    use crate::tasks::{MemoryTaskStore, TaskStatus};
    use tempfile::TempDir;

    /// A service over an in-memory database and task table, storing
    /// originals under a scratch directory.
    pub(crate) struct TestService {
        pub service: Arc<DocChatService>,
        pub fakes: FakeProviders,
        pub task_table: Arc<MemoryTaskStore>,
        pub _dir: TempDir,
    }

    pub(crate) fn test_config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.embeddings.chunk_size = 200;
        config.embeddings.chunk_overlap = 40;
        config.embeddings.batch_size = 4;
        config.limits.max_document_size_bytes = 64 * 1024;
        config
    }

    pub(crate) fn test_service() -> TestService {
        test_service_with(FakeProviders::new(), |_| {})
    }

    pub(crate) fn test_service_with(
        fakes: FakeProviders,
        configure: impl FnOnce(&mut AppConfig),
    ) -> TestService {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        configure(&mut config);

        let task_table = Arc::new(MemoryTaskStore::new());
        let service = DocChatService::new(
            Arc::new(config),
            Arc::new(Database::open_in_memory().unwrap()),
            task_table.clone(),
            fakes.providers(),
        );

        TestService {
            service: Arc::new(service),
            fakes,
            task_table,
            _dir: dir,
        }
    }

    /// Poll until the task reaches a terminal state.
    pub(crate) async fn wait_for_terminal(service: &DocChatService, task_id: &str) -> TaskState {
        for _ in 0..500 {
            let state = service.task_status(task_id).await.unwrap();
            if state.status.is_terminal() {
                return state;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("task {} did not finish", task_id);
    }

    pub(crate) fn lighthouse_text() -> String {
        [
            "Lighthouses guide ships along dangerous coasts.",
            "A keeper trims the lamp wick every evening and records the weather.",
            "Fog horns sound when visibility drops below one mile.",
            "Storm seasons bring the highest waves in late autumn.",
        ]
        .iter()
        .cycle()
        .take(24)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n\n")
    }

    pub(crate) fn assert_completed(state: &TaskState) {
        assert_eq!(state.status, TaskStatus::Completed, "message: {}", state.message);
        assert_eq!(state.progress, 100);
    }
}

//! Periodic eviction of finished tasks and expired collections.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult, format_error_chain};
use crate::service::DocChatService;

/// What one sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tasks_evicted: usize,
    pub collections_deleted: usize,
}

impl DocChatService {
    /// Evict terminal tasks past retention and, when a TTL is configured,
    /// delete collections older than it.
    pub async fn sweep_expired(&self) -> ServiceResult<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        let retention = chrono::Duration::from_std(self.config.tasks.retention()).map_err(|e| {
            ServiceError::Config {
                message: format!("tasks.retention_secs out of range: {}", e),
            }
        })?;
        report.tasks_evicted = self.tasks.evict_terminal_before(now - retention).await?;

        if let Some(ttl_secs) = self.config.storage.collection_ttl_secs {
            let cutoff = now - chrono::Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64);
            for name in self.db.collections_created_before(cutoff)? {
                match self.delete_collection(&name).await {
                    Ok(()) => report.collections_deleted += 1,
                    // Already removed by a concurrent delete
                    Err(ServiceError::CollectionNotFound { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                tasks_evicted = report.tasks_evicted,
                collections_deleted = report.collections_deleted,
                "Retention sweep"
            );
        }
        Ok(report)
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `tasks.sweep_interval_secs`
    /// until `shutdown` is cancelled.
    pub fn spawn_retention_sweeper(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let service = self.clone();
        let period = service.config.tasks.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            debug!(interval_secs = period.as_secs(), "Retention sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Retention sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = service.sweep_expired().await {
                            warn!(error = %format_error_chain(&e), "Retention sweep failed");
                        }
                    }
                }
            }
        })
    }
}

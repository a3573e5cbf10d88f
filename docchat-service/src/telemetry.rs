//! Service metrics.

use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{ServiceError, ServiceResult};

pub const UPLOADS_TOTAL: &str = "docchat_uploads_total";
pub const TASKS_COMPLETED_TOTAL: &str = "docchat_tasks_completed_total";
pub const TASKS_FAILED_TOTAL: &str = "docchat_tasks_failed_total";
pub const CHAT_REQUESTS_TOTAL: &str = "docchat_chat_requests_total";
pub const CHAT_FAILURES_TOTAL: &str = "docchat_chat_failures_total";
pub const INDEXING_SECONDS: &str = "docchat_indexing_seconds";

/// Install the global Prometheus recorder and describe the service metrics.
pub fn install_metrics_recorder() -> ServiceResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServiceError::Internal {
            message: format!("Failed to install metrics recorder: {}", e),
        })?;

    describe_counter!(UPLOADS_TOTAL, "Uploads accepted for processing");
    describe_counter!(TASKS_COMPLETED_TOTAL, "Upload tasks that finished indexing");
    describe_counter!(TASKS_FAILED_TOTAL, "Upload tasks that failed");
    describe_counter!(CHAT_REQUESTS_TOTAL, "Chat requests received");
    describe_counter!(CHAT_FAILURES_TOTAL, "Chat requests that failed to produce an answer");
    describe_histogram!(
        INDEXING_SECONDS,
        Unit::Seconds,
        "Time from task start to indexed collection"
    );

    Ok(handle)
}

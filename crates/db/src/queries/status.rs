// crates/db/src/queries/status.rs
// Per-session message-processing status aggregate.

use crate::{Database, DbResult, StoreError, STATUS_QUERY_TIMEOUT};
use chrono::Utc;
use context_hub_types::{ObservingStatus, ProcessStatus};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

impl Database {
    /// Compute how many of a session's messages have been observed
    /// (`success`), are in process (`running`), or are still pending.
    ///
    /// Takes the session ID as the raw string handlers receive; a blank or
    /// non-UUID value is an `InvalidArgument`. The aggregate runs under
    /// [`STATUS_QUERY_TIMEOUT`].
    pub async fn get_observing_status(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> DbResult<ObservingStatus> {
        let trimmed = session_id.trim();
        if trimmed.is_empty() {
            return Err(StoreError::invalid_argument("session id must not be empty"));
        }
        let session_id = Uuid::parse_str(trimmed)
            .map_err(|_| StoreError::invalid_argument("session id must be a valid UUID"))?;

        let aggregate = sqlx::query_as::<_, (String, i64)>(
            "SELECT session_task_process_status, COUNT(*)
             FROM messages WHERE session_id = $1
             GROUP BY session_task_process_status",
        )
        .bind(session_id)
        .fetch_all(self.pool());

        let rows = tokio::select! {
            result = tokio::time::timeout(STATUS_QUERY_TIMEOUT, aggregate) => {
                result.map_err(|_| StoreError::DeadlineExceeded)??
            }
            _ = cancel.cancelled() => return Err(StoreError::Canceled),
        };

        let mut status = ObservingStatus {
            observed: 0,
            in_process: 0,
            pending: 0,
            updated_at: Utc::now(),
        };
        for (name, count) in rows {
            if count < 0 {
                return Err(StoreError::internal(format!(
                    "negative count {count} for status {name}"
                )));
            }
            match ProcessStatus::from_db_str(&name) {
                ProcessStatus::Success => status.observed += count,
                ProcessStatus::Running => status.in_process += count,
                ProcessStatus::Pending => status.pending += count,
                ProcessStatus::Failed => {}
            }
        }
        Ok(status)
    }
}

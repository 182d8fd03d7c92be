//! Outcome recording with logging and dead-letter escalation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::errors::QueueError;
use crate::store::{QueueStore, RecordOutcome};

/// Transitions queue items to generated/failed/handed-off and persists the
/// outcome details.
///
/// All operations are idempotent against rows that are missing or already
/// terminal: such calls are logged and otherwise do nothing. A failure that
/// spends the last of the retry budget is escalated at `error` level so the
/// alerting path picks it up.
#[derive(Clone)]
pub struct ResultRecorder {
    store: Arc<dyn QueueStore>,
}

impl ResultRecorder {
    /// Create a recorder over `store`.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Mark the item as generated.
    pub async fn record_success(
        &self,
        id: i64,
        elapsed: Duration,
        output_location: &str,
    ) -> Result<RecordOutcome, QueueError> {
        let outcome = self.store.record_success(id, elapsed, output_location).await?;

        match outcome {
            RecordOutcome::Skipped => {
                warn!(item.id = id, "Success reported for a missing or terminal queue item");
            }
            _ => {
                debug!(
                    item.id = id,
                    output = output_location,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Successfully generated document"
                );
            }
        }

        Ok(outcome)
    }

    /// Record a failed attempt.
    pub async fn record_failure(
        &self,
        id: i64,
        reason: &str,
        fallback_output: &str,
    ) -> Result<RecordOutcome, QueueError> {
        let outcome = self.store.record_failure(id, reason, fallback_output).await?;

        match outcome {
            RecordOutcome::Applied => {
                warn!(item.id = id, reason, "Document generation attempt failed");
            }
            RecordOutcome::Exhausted => {
                error!(
                    item.id = id,
                    reason, "Document generation retry budget exhausted; item needs manual handling"
                );
            }
            RecordOutcome::Skipped => {
                warn!(item.id = id, "Failure reported for a missing or terminal queue item");
            }
        }

        Ok(outcome)
    }

    /// Record that generation continues under an external background job.
    pub async fn record_handoff(
        &self,
        id: i64,
        background_job_id: i64,
        document_code: &str,
    ) -> Result<RecordOutcome, QueueError> {
        let outcome = self
            .store
            .record_handoff(id, background_job_id, document_code)
            .await?;

        match outcome {
            RecordOutcome::Skipped => {
                warn!(item.id = id, "Hand-off reported for a missing or terminal queue item");
            }
            _ => {
                debug!(
                    item.id = id,
                    background_job_id, document_code, "Handed document off to background job"
                );
            }
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for ResultRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultRecorder").finish_non_exhaustive()
    }
}

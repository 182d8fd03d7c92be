//! The narrow interface over the backing queue table.
//!
//! Everything the queue knows about persistence goes through [`QueueStore`].
//! The contract every implementation must uphold: claiming is a single
//! atomic operation (observing an unclaimed eligible row and stamping the
//! owner must never be two separate steps), and recording operations are
//! no-ops against rows that are missing or already terminal.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{EnqueueError, QueueError};
use crate::schema::{DocumentType, NewQueueItem, QueueItem};

/// What a recording operation did to the targeted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The row was mutated and remains retryable (or became generated).
    Applied,
    /// The failure was recorded and the retry budget is now spent; the row
    /// is a dead letter from here on.
    Exhausted,
    /// The row is missing or already terminal; nothing was changed.
    Skipped,
}

/// Durable table of queue items with atomic claim and update operations.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a new generation request in the initial state
    /// (`generated = false`, `attempts = 0`, unclaimed).
    ///
    /// Returns the id of the new row.
    async fn enqueue(&self, item: NewQueueItem) -> Result<i64, EnqueueError>;

    /// Atomically select up to `max_items` eligible rows, oldest first, and
    /// stamp `instance_id` onto every selected row that is still unclaimed.
    ///
    /// Eligible means: not generated, no background job in flight, retry
    /// budget remaining, and unclaimed or already claimed by `instance_id`.
    /// Rows claimed by a different instance are never returned.
    async fn claim_batch(
        &self,
        max_items: u32,
        instance_id: &str,
    ) -> Result<Vec<QueueItem>, QueueError>;

    /// Mark a row as generated: sets the terminal flag, records duration and
    /// output location, stamps the generation time, and bumps `attempts`.
    async fn record_success(
        &self,
        id: i64,
        elapsed: Duration,
        output_location: &str,
    ) -> Result<RecordOutcome, QueueError>;

    /// Record a failed attempt: bumps `attempts`, persists the reason and the
    /// fallback output reference, and releases the claim once the retry
    /// budget is spent (until then the same owner retries the row).
    async fn record_failure(
        &self,
        id: i64,
        reason: &str,
        fallback_output: &str,
    ) -> Result<RecordOutcome, QueueError>;

    /// Record that generation continues under an external asynchronous job.
    /// The row leaves the claim pool until that job reports back.
    async fn record_handoff(
        &self,
        id: i64,
        background_job_id: i64,
        document_code: &str,
    ) -> Result<RecordOutcome, QueueError>;

    /// Fetch one row by id.
    async fn find(&self, id: i64) -> Result<Option<QueueItem>, QueueError>;

    /// Whether any retryable, not-yet-generated row exists for the file.
    async fn has_pending_work(&self, insurance_file_key: i32) -> Result<bool, QueueError>;

    /// Whether a generated row of the given type exists for the file.
    async fn is_generated(
        &self,
        insurance_file_key: i32,
        document_type: DocumentType,
    ) -> Result<bool, QueueError>;

    /// Dead letters: rows that spent their retry budget without succeeding,
    /// oldest first.
    async fn exhausted_items(&self, limit: u32) -> Result<Vec<QueueItem>, QueueError>;
}

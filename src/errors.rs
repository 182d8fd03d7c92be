use thiserror::Error;

/// Error returned when a new queue item could not be persisted.
///
/// Enqueueing deliberately does not pretend to always succeed: a store
/// outage or constraint violation propagates to the producer instead of
/// being swallowed.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The backing store rejected or failed the insert.
    #[error("failed to persist queue item: {0}")]
    Database(#[from] sqlx::Error),
}

/// Store-level error raised by queue operations.
///
/// These are fatal to the current processing cycle and surface to the
/// operational trigger; per-item generation failures are recorded against
/// the item instead and never take this path.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing store failed.
    #[error("queue store error: {0}")]
    Database(#[from] sqlx::Error),
}

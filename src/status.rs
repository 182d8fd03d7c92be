//! Read-only status checks for callers outside the queue.

use std::sync::Arc;

use crate::errors::QueueError;
use crate::schema::{DocumentType, QueueItem};
use crate::store::QueueStore;

/// Membership and status queries over the queue table. Pure reads.
#[derive(Clone)]
pub struct StatusQuery {
    store: Arc<dyn QueueStore>,
}

impl StatusQuery {
    /// Create a query handle over `store`.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Whether any document for the file is still waiting to be generated.
    ///
    /// Exhausted items do not count: they are no longer retryable, and
    /// callers must not wait on them as if they were.
    pub async fn has_pending_work(&self, insurance_file_key: i32) -> Result<bool, QueueError> {
        self.store.has_pending_work(insurance_file_key).await
    }

    /// Whether a document of the given type was generated for the file.
    pub async fn is_generated(
        &self,
        insurance_file_key: i32,
        document_type: DocumentType,
    ) -> Result<bool, QueueError> {
        self.store.is_generated(insurance_file_key, document_type).await
    }

    /// Dead letters: items that spent their retry budget without succeeding,
    /// oldest first. Surfaced for manual or alternate handling.
    pub async fn exhausted(&self, limit: u32) -> Result<Vec<QueueItem>, QueueError> {
        self.store.exhausted_items(limit).await
    }
}

impl std::fmt::Debug for StatusQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusQuery").finish_non_exhaustive()
    }
}

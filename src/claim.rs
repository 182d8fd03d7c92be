//! Batch claiming pinned to one worker instance.

use std::sync::Arc;

use tracing::trace;

use crate::errors::QueueError;
use crate::schema::QueueItem;
use crate::store::QueueStore;

/// Selects a bounded batch of eligible pending items and marks them as owned
/// by the local worker instance.
///
/// Items already stamped with this instance's tag from an earlier partial run
/// come back in the batch too; items stamped by any other instance never do.
/// Claiming stamps ownership and nothing else: `attempts` and `generated` are
/// untouched.
#[derive(Clone)]
pub struct ClaimCoordinator {
    store: Arc<dyn QueueStore>,
    instance_id: String,
}

impl ClaimCoordinator {
    /// Create a coordinator claiming on behalf of `instance_id`.
    pub fn new(store: Arc<dyn QueueStore>, instance_id: impl Into<String>) -> Self {
        Self {
            store,
            instance_id: instance_id.into(),
        }
    }

    /// The instance tag stamped onto claimed items.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Claim up to `max_items` eligible items, oldest first.
    pub async fn claim_batch(&self, max_items: u32) -> Result<Vec<QueueItem>, QueueError> {
        let batch = self.store.claim_batch(max_items, &self.instance_id).await?;
        trace!(
            instance = %self.instance_id,
            claimed = batch.len(),
            "Claimed queue batch"
        );
        Ok(batch)
    }
}

impl std::fmt::Debug for ClaimCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimCoordinator")
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

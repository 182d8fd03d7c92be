//! In-process [`QueueStore`] with the same semantics as the Postgres store.
//!
//! Claiming and recording serialize behind one mutex, which gives the same
//! atomicity guarantee the Postgres store gets from its single-statement
//! claim. Useful for tests and for embedders that do not need durability.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::errors::{EnqueueError, QueueError};
use crate::schema::{DocumentType, NewQueueItem, QueueItem, MAX_ATTEMPTS};
use crate::store::{QueueStore, RecordOutcome};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    items: BTreeMap<i64, QueueItem>,
}

/// [`QueueStore`] backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    server_tag: String,
    inner: Mutex<Inner>,
}

impl MemoryQueueStore {
    /// Create an empty store. `server_tag` identifies this process on rows
    /// it enqueues.
    pub fn new(server_tag: impl Into<String>) -> Self {
        Self {
            server_tag: server_tag.into(),
            inner: Mutex::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic while holding it; the queue state is
        // still consistent because every mutation is a single assignment.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn is_eligible(item: &QueueItem, instance_id: &str) -> bool {
    !item.generated
        && item.background_job_id.is_none()
        && item.attempts < MAX_ATTEMPTS
        && item
            .owner_tag
            .as_deref()
            .map_or(true, |owner| owner == instance_id)
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, item: NewQueueItem) -> Result<i64, EnqueueError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;

        inner.items.insert(
            id,
            QueueItem {
                id,
                insurance_ref: item.insurance_ref,
                insurance_file_key: item.insurance_file_key,
                insurance_folder_key: item.insurance_folder_key,
                insurance_file_type_code: item.insurance_file_type_code,
                client_id: item.client_id,
                document_type: item.document_type,
                generated: false,
                attempts: 0,
                owner_tag: None,
                background_job_id: None,
                created_at: Utc::now(),
                generated_at: None,
                duration_ms: None,
                document_code: None,
                output_location: None,
                user: item.user,
                failure_reason: None,
                server_issued: self.server_tag.clone(),
            },
        );

        Ok(id)
    }

    async fn claim_batch(
        &self,
        max_items: u32,
        instance_id: &str,
    ) -> Result<Vec<QueueItem>, QueueError> {
        let mut inner = self.lock();

        let mut candidates: Vec<i64> = inner
            .items
            .values()
            .filter(|item| is_eligible(item, instance_id))
            .map(|item| item.id)
            .collect();
        candidates.sort_by_key(|id| {
            let item = &inner.items[id];
            (item.created_at, item.id)
        });
        candidates.truncate(max_items as usize);

        let mut batch = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(item) = inner.items.get_mut(&id) {
                if item.owner_tag.is_none() {
                    item.owner_tag = Some(instance_id.to_owned());
                }
                batch.push(item.clone());
            }
        }

        Ok(batch)
    }

    async fn record_success(
        &self,
        id: i64,
        elapsed: Duration,
        output_location: &str,
    ) -> Result<RecordOutcome, QueueError> {
        let mut inner = self.lock();
        let Some(item) = inner.items.get_mut(&id).filter(|item| !item.is_terminal()) else {
            return Ok(RecordOutcome::Skipped);
        };

        item.generated = true;
        item.attempts += 1;
        item.duration_ms = Some(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
        item.generated_at = Some(Utc::now());
        item.output_location = Some(output_location.to_owned());
        item.failure_reason = None;

        Ok(RecordOutcome::Applied)
    }

    async fn record_failure(
        &self,
        id: i64,
        reason: &str,
        fallback_output: &str,
    ) -> Result<RecordOutcome, QueueError> {
        let mut inner = self.lock();
        let Some(item) = inner.items.get_mut(&id).filter(|item| !item.is_terminal()) else {
            return Ok(RecordOutcome::Skipped);
        };

        item.attempts += 1;
        item.failure_reason = Some(reason.to_owned());
        item.output_location = Some(fallback_output.to_owned());
        // A failed hand-off goes back into the claim pool.
        item.background_job_id = None;

        if item.attempts >= MAX_ATTEMPTS {
            item.owner_tag = None;
            Ok(RecordOutcome::Exhausted)
        } else {
            Ok(RecordOutcome::Applied)
        }
    }

    async fn record_handoff(
        &self,
        id: i64,
        background_job_id: i64,
        document_code: &str,
    ) -> Result<RecordOutcome, QueueError> {
        let mut inner = self.lock();
        let Some(item) = inner.items.get_mut(&id).filter(|item| !item.is_terminal()) else {
            return Ok(RecordOutcome::Skipped);
        };

        item.background_job_id = Some(background_job_id);
        item.document_code = Some(document_code.to_owned());

        Ok(RecordOutcome::Applied)
    }

    async fn find(&self, id: i64) -> Result<Option<QueueItem>, QueueError> {
        Ok(self.lock().items.get(&id).cloned())
    }

    async fn has_pending_work(&self, insurance_file_key: i32) -> Result<bool, QueueError> {
        Ok(self.lock().items.values().any(|item| {
            item.insurance_file_key == insurance_file_key
                && !item.generated
                && item.attempts < MAX_ATTEMPTS
        }))
    }

    async fn is_generated(
        &self,
        insurance_file_key: i32,
        document_type: DocumentType,
    ) -> Result<bool, QueueError> {
        Ok(self.lock().items.values().any(|item| {
            item.insurance_file_key == insurance_file_key
                && item.document_type == document_type
                && item.generated
        }))
    }

    async fn exhausted_items(&self, limit: u32) -> Result<Vec<QueueItem>, QueueError> {
        let inner = self.lock();
        let mut items: Vec<QueueItem> = inner
            .items
            .values()
            .filter(|item| item.is_exhausted())
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.created_at, item.id));
        items.truncate(limit as usize);
        Ok(items)
    }
}

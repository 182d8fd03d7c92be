//! Postgres-backed [`QueueStore`].
//!
//! The claim step is the correctness-critical part: it is one statement
//! that selects eligible rows with `FOR UPDATE SKIP LOCKED` and stamps the
//! owner in the same `UPDATE`, so two instances can never both observe an
//! unclaimed row and both take it.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::errors::{EnqueueError, QueueError};
use crate::schema::{DocumentType, NewQueueItem, QueueItem, MAX_ATTEMPTS};
use crate::store::{QueueStore, RecordOutcome};

const COLUMNS: &str = "id, insurance_ref, insurance_file_key, insurance_folder_key, \
     insurance_file_type_code, client_id, document_type, generated, attempts, \
     owner_tag, background_job_id, created_at, generated_at, duration_ms, \
     document_code, output_location, submitted_by, failure_reason, server_issued";

/// [`QueueStore`] over a shared Postgres table.
#[derive(Debug, Clone)]
pub struct PgQueueStore {
    pool: PgPool,
    server_tag: String,
}

impl PgQueueStore {
    /// Create a store over `pool`. `server_tag` identifies this process on
    /// rows it enqueues; it plays no part in claiming.
    pub fn new(pool: PgPool, server_tag: impl Into<String>) -> Self {
        Self {
            pool,
            server_tag: server_tag.into(),
        }
    }

    /// Create the queue table if it does not exist yet.
    pub async fn setup(&self) -> Result<(), QueueError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS document_queue (
                id BIGSERIAL PRIMARY KEY,
                insurance_ref TEXT NOT NULL,
                insurance_file_key INT NOT NULL,
                insurance_folder_key INT NOT NULL,
                insurance_file_type_code TEXT NOT NULL,
                client_id INT NOT NULL,
                document_type INT NOT NULL,
                generated BOOLEAN NOT NULL DEFAULT FALSE,
                attempts INT NOT NULL DEFAULT 0,
                owner_tag TEXT,
                background_job_id BIGINT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                generated_at TIMESTAMPTZ,
                duration_ms BIGINT,
                document_code TEXT,
                output_location TEXT,
                submitted_by TEXT NOT NULL,
                failure_reason TEXT,
                server_issued TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn enqueue(&self, item: NewQueueItem) -> Result<i64, EnqueueError> {
        let id = sqlx::query_scalar::<_, i64>(
            r"
            INSERT INTO document_queue
                (insurance_ref, insurance_file_key, insurance_folder_key,
                 insurance_file_type_code, client_id, document_type,
                 submitted_by, server_issued)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            ",
        )
        .bind(&item.insurance_ref)
        .bind(item.insurance_file_key)
        .bind(item.insurance_folder_key)
        .bind(&item.insurance_file_type_code)
        .bind(item.client_id)
        .bind(item.document_type)
        .bind(&item.user)
        .bind(&self.server_tag)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn claim_batch(
        &self,
        max_items: u32,
        instance_id: &str,
    ) -> Result<Vec<QueueItem>, QueueError> {
        let sql = format!(
            r"
            WITH eligible AS (
                SELECT id FROM document_queue
                WHERE generated = FALSE
                  AND background_job_id IS NULL
                  AND attempts < $1
                  AND (owner_tag IS NULL OR owner_tag = $2)
                ORDER BY created_at, id
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE document_queue AS q
            SET owner_tag = $2
            FROM eligible
            WHERE q.id = eligible.id
            RETURNING {COLUMNS}
            "
        );

        let mut batch = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(MAX_ATTEMPTS)
            .bind(instance_id)
            .bind(i64::from(max_items))
            .fetch_all(&self.pool)
            .await?;

        // UPDATE ... RETURNING does not guarantee row order.
        batch.sort_by_key(|item| (item.created_at, item.id));
        Ok(batch)
    }

    async fn record_success(
        &self,
        id: i64,
        elapsed: Duration,
        output_location: &str,
    ) -> Result<RecordOutcome, QueueError> {
        let duration_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);

        let result = sqlx::query(
            r"
            UPDATE document_queue
            SET generated = TRUE,
                attempts = attempts + 1,
                duration_ms = $2,
                generated_at = NOW(),
                output_location = $3,
                failure_reason = NULL
            WHERE id = $1 AND generated = FALSE AND attempts < $4
            ",
        )
        .bind(id)
        .bind(duration_ms)
        .bind(output_location)
        .bind(MAX_ATTEMPTS)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(RecordOutcome::Skipped)
        } else {
            Ok(RecordOutcome::Applied)
        }
    }

    async fn record_failure(
        &self,
        id: i64,
        reason: &str,
        fallback_output: &str,
    ) -> Result<RecordOutcome, QueueError> {
        // The claim is only released once the budget is spent; until then the
        // original owner retries the item. Clearing the background job id
        // returns a failed hand-off to the claim pool.
        let attempts = sqlx::query_scalar::<_, i32>(
            r"
            UPDATE document_queue
            SET attempts = attempts + 1,
                failure_reason = $2,
                output_location = $3,
                background_job_id = NULL,
                owner_tag = CASE WHEN attempts + 1 >= $4 THEN NULL ELSE owner_tag END
            WHERE id = $1 AND generated = FALSE AND attempts < $4
            RETURNING attempts
            ",
        )
        .bind(id)
        .bind(reason)
        .bind(fallback_output)
        .bind(MAX_ATTEMPTS)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match attempts {
            None => RecordOutcome::Skipped,
            Some(n) if n >= MAX_ATTEMPTS => RecordOutcome::Exhausted,
            Some(_) => RecordOutcome::Applied,
        })
    }

    async fn record_handoff(
        &self,
        id: i64,
        background_job_id: i64,
        document_code: &str,
    ) -> Result<RecordOutcome, QueueError> {
        let result = sqlx::query(
            r"
            UPDATE document_queue
            SET background_job_id = $2, document_code = $3
            WHERE id = $1 AND generated = FALSE AND attempts < $4
            ",
        )
        .bind(id)
        .bind(background_job_id)
        .bind(document_code)
        .bind(MAX_ATTEMPTS)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(RecordOutcome::Skipped)
        } else {
            Ok(RecordOutcome::Applied)
        }
    }

    async fn find(&self, id: i64) -> Result<Option<QueueItem>, QueueError> {
        let sql = format!("SELECT {COLUMNS} FROM document_queue WHERE id = $1");
        let item = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn has_pending_work(&self, insurance_file_key: i32) -> Result<bool, QueueError> {
        let pending = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT 1 FROM document_queue
                WHERE insurance_file_key = $1
                  AND generated = FALSE
                  AND attempts < $2
            )
            ",
        )
        .bind(insurance_file_key)
        .bind(MAX_ATTEMPTS)
        .fetch_one(&self.pool)
        .await?;

        Ok(pending)
    }

    async fn is_generated(
        &self,
        insurance_file_key: i32,
        document_type: DocumentType,
    ) -> Result<bool, QueueError> {
        let generated = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT 1 FROM document_queue
                WHERE insurance_file_key = $1
                  AND document_type = $2
                  AND generated = TRUE
            )
            ",
        )
        .bind(insurance_file_key)
        .bind(document_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(generated)
    }

    async fn exhausted_items(&self, limit: u32) -> Result<Vec<QueueItem>, QueueError> {
        let sql = format!(
            r"
            SELECT {COLUMNS} FROM document_queue
            WHERE generated = FALSE AND attempts >= $1
            ORDER BY created_at, id
            LIMIT $2
            "
        );

        let items = sqlx::query_as::<_, QueueItem>(&sql)
            .bind(MAX_ATTEMPTS)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }
}

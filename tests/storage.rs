#![allow(missing_docs)]
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

//! Postgres store integration tests.
//!
//! These run only when `DATABASE_URL` points at a reachable Postgres
//! instance; without one they pass as no-ops so the rest of the suite does
//! not depend on infrastructure.

use std::sync::Arc;
use std::time::Duration;

use claims::assert_some;
use docq::schema::{DocumentType, NewQueueItem, MAX_ATTEMPTS};
use docq::{PgQueueStore, QueueStore, RecordOutcome};
use sqlx::PgPool;
use tokio::sync::Mutex;

// The table is shared; serialize tests so one test's claim cannot steal
// another's rows.
static DB_LOCK: Mutex<()> = Mutex::const_new(());

async fn connect() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    PgPool::connect(&url).await.ok()
}

async fn fresh_store(pool: &PgPool) -> anyhow::Result<Arc<dyn QueueStore>> {
    let store = PgQueueStore::new(pool.clone(), "pg-test");
    store.setup().await?;
    sqlx::query("TRUNCATE document_queue").execute(pool).await?;
    Ok(Arc::new(store))
}

fn request(insurance_file_key: i32, document_type: DocumentType) -> NewQueueItem {
    NewQueueItem {
        insurance_ref: format!("HH-{insurance_file_key}"),
        insurance_file_key,
        insurance_folder_key: 7,
        insurance_file_type_code: "NB".into(),
        client_id: 9,
        document_type,
        user: "jsmith".into(),
    }
}

#[tokio::test]
async fn claim_stamps_the_owner_and_success_is_terminal() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = connect().await else {
        return Ok(());
    };
    let store = fresh_store(&pool).await?;

    let id = store.enqueue(request(1, DocumentType::Schedule)).await?;

    let batch = store.claim_batch(10, "W1").await?;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, id);
    assert_eq!(batch[0].owner_tag.as_deref(), Some("W1"));

    // Claimed by W1 means invisible to W2.
    assert!(store.claim_batch(10, "W2").await?.is_empty());

    let outcome = store
        .record_success(id, Duration::from_millis(1500), "out.pdf")
        .await?;
    assert_eq!(outcome, RecordOutcome::Applied);

    assert!(store.is_generated(1, DocumentType::Schedule).await?);
    assert!(!store.has_pending_work(1).await?);
    assert!(store.claim_batch(10, "W1").await?.is_empty());

    let item = assert_some!(store.find(id).await?);
    assert!(item.generated);
    assert_eq!(item.attempts, 1);
    assert_eq!(item.duration_ms, Some(1500));

    // Terminal: further recording is a no-op.
    let outcome = store.record_failure(id, "late", "err.pdf").await?;
    assert_eq!(outcome, RecordOutcome::Skipped);

    Ok(())
}

#[tokio::test]
async fn failures_spend_the_budget_and_release_the_claim_at_the_end() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = connect().await else {
        return Ok(());
    };
    let store = fresh_store(&pool).await?;

    let id = store.enqueue(request(2, DocumentType::Certificate)).await?;
    store.claim_batch(1, "W1").await?;

    for _ in 1..MAX_ATTEMPTS {
        let outcome = store.record_failure(id, "template missing", "err.pdf").await?;
        assert_eq!(outcome, RecordOutcome::Applied);

        let item = assert_some!(store.find(id).await?);
        assert_eq!(item.owner_tag.as_deref(), Some("W1"));
    }

    let outcome = store.record_failure(id, "template missing", "err.pdf").await?;
    assert_eq!(outcome, RecordOutcome::Exhausted);

    let item = assert_some!(store.find(id).await?);
    assert_eq!(item.attempts, MAX_ATTEMPTS);
    assert_eq!(item.owner_tag, None);
    assert!(!item.generated);

    assert!(store.claim_batch(10, "W1").await?.is_empty());
    assert!(!store.has_pending_work(2).await?);
    assert_eq!(store.exhausted_items(10).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn claiming_is_fifo_and_skips_handed_off_items() -> anyhow::Result<()> {
    let _guard = DB_LOCK.lock().await;
    let Some(pool) = connect().await else {
        return Ok(());
    };
    let store = fresh_store(&pool).await?;

    let first = store.enqueue(request(3, DocumentType::Schedule)).await?;
    let second = store.enqueue(request(4, DocumentType::Invoice)).await?;
    let third = store.enqueue(request(5, DocumentType::Renewal)).await?;

    store.record_handoff(first, 42, "TPL01").await?;

    let batch = store.claim_batch(10, "W1").await?;
    let ids: Vec<i64> = batch.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![second, third]);

    // A failed hand-off clears the job id and rejoins the claim pool.
    let outcome = store
        .record_failure(first, "background job failed", "err.pdf")
        .await?;
    assert_eq!(outcome, RecordOutcome::Applied);

    let batch = store.claim_batch(10, "W1").await?;
    let ids: Vec<i64> = batch.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![first, second, third]);

    let item = assert_some!(store.find(first).await?);
    assert_eq!(item.background_job_id, None);
    assert_eq!(item.attempts, 1);

    Ok(())
}

//! The processing loop that drains claimed batches.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::claim::ClaimCoordinator;
use crate::errors::QueueError;
use crate::generator::{
    policy_type, DocumentGenerator, GenerationOutcome, TemplateLookup, WordingResolver,
};
use crate::recorder::ResultRecorder;
use crate::schema::{DocumentType, QueueItem};
use crate::store::QueueStore;

/// Placeholder recorded as the output location when a document cannot be
/// generated for this attempt.
pub const GENERATION_ERROR_FALLBACK: &str = r"Wording\DocumentGenerationError.pdf";

const DEFAULT_BATCH_SIZE: u32 = 1;

/// Repeatedly claims batches of eligible items and dispatches each one to
/// the rendering collaborators, recording every outcome.
///
/// One loop processes its batch sequentially; cancellation is cooperative
/// and checked once per item, so an in-flight generation call is never
/// preempted. A cancelled run leaves unfinished items claimed; they come
/// back in this instance's next run. The cycle ends on its own when a claim
/// returns no items.
///
/// Per-item failures never abort the batch: they are logged and recorded
/// against the item, which always bumps `attempts`. Only store-level
/// failures end the cycle early, surfacing to the operational trigger.
pub struct ProcessingLoop {
    claims: ClaimCoordinator,
    recorder: ResultRecorder,
    generator: Arc<dyn DocumentGenerator>,
    templates: Arc<dyn TemplateLookup>,
    wordings: Arc<dyn WordingResolver>,
    batch_size: u32,
}

impl ProcessingLoop {
    /// Create a loop claiming on behalf of `instance_id`.
    pub fn new(
        store: Arc<dyn QueueStore>,
        generator: Arc<dyn DocumentGenerator>,
        templates: Arc<dyn TemplateLookup>,
        wordings: Arc<dyn WordingResolver>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            claims: ClaimCoordinator::new(Arc::clone(&store), instance_id),
            recorder: ResultRecorder::new(store),
            generator,
            templates,
            wordings,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set how many items one claim cycle may take. Defaults to 1.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run claim cycles until no eligible work remains or `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), QueueError> {
        loop {
            let batch = self.claims.claim_batch(self.batch_size).await?;
            if batch.is_empty() {
                debug!("No eligible queue items found. Ending the processing cycle…");
                return Ok(());
            }

            for item in batch {
                if cancel.is_cancelled() {
                    debug!("Cancellation requested. Leaving remaining items claimed…");
                    return Ok(());
                }

                let span = info_span!(
                    "item",
                    item.id = item.id,
                    item.document_type = %item.document_type,
                    item.insurance_ref = %item.insurance_ref,
                );
                self.process_item(&item).instrument(span).await?;
            }
        }
    }

    async fn process_item(&self, item: &QueueItem) -> Result<(), QueueError> {
        match item.document_type {
            DocumentType::Wording => self.process_wording(item).await,
            DocumentType::Schedule
            | DocumentType::Certificate
            | DocumentType::Invoice
            | DocumentType::Renewal => self.process_templated(item).await,
        }
    }

    /// Wording documents skip template resolution entirely: the output path
    /// comes from reference data and success is recorded directly.
    async fn process_wording(&self, item: &QueueItem) -> Result<(), QueueError> {
        let code = match self.wordings.wording_code(item.insurance_file_key).await {
            Ok(code) => code,
            Err(error) => {
                let reason = format!(
                    "Error resolving wording for {}: {error:#}",
                    item.insurance_ref
                );
                return self.record_item_failure(item, &reason).await;
            }
        };

        let path = self.wordings.wording_path(&code, policy_type(&item.insurance_ref));
        self.recorder
            .record_success(item.id, Duration::ZERO, &path)
            .await?;
        debug!(wording.code = %code, wording.path = %path, "Updated wording document");

        Ok(())
    }

    async fn process_templated(&self, item: &QueueItem) -> Result<(), QueueError> {
        let resolved = self
            .templates
            .template_code(
                &item.insurance_ref,
                &item.insurance_file_type_code,
                item.document_type,
            )
            .await;

        let template_code = match resolved {
            Ok(code) => code.unwrap_or_default(),
            Err(error) => {
                let reason = format!(
                    "Error resolving template for document {} for {}: {error:#}",
                    item.document_type, item.insurance_ref
                );
                return self.record_item_failure(item, &reason).await;
            }
        };

        let exists = if template_code.is_empty() {
            false
        } else {
            match self.templates.template_exists(&template_code).await {
                Ok(exists) => exists,
                Err(error) => {
                    let reason = format!(
                        "Error checking template '{template_code}' for document {} for {}: {error:#}",
                        item.document_type, item.insurance_ref
                    );
                    return self.record_item_failure(item, &reason).await;
                }
            }
        };

        if !exists {
            let reason = format!(
                "The document template code '{template_code}' or the document template \
                 artifact could not be found for document type {} - {}",
                item.document_type, item.insurance_ref
            );
            return self.record_item_failure(item, &reason).await;
        }

        let started = Instant::now();
        match self.generator.generate(item, &template_code).await {
            Ok(GenerationOutcome::Completed { output_location }) => {
                self.recorder
                    .record_success(item.id, started.elapsed(), &output_location)
                    .await?;
            }
            Ok(GenerationOutcome::HandedOff {
                background_job_id,
                document_code,
            }) => {
                self.recorder
                    .record_handoff(item.id, background_job_id, &document_code)
                    .await?;
            }
            Err(error) => {
                let reason = format!(
                    "Error generating document {} for {}: {error:#}",
                    item.document_type, item.insurance_ref
                );
                self.record_item_failure(item, &reason).await?;
            }
        }

        Ok(())
    }

    /// Every contained failure lands here so an item can never be left in a
    /// claimed state with `attempts` unchanged.
    async fn record_item_failure(
        &self,
        item: &QueueItem,
        reason: &str,
    ) -> Result<(), QueueError> {
        self.recorder
            .record_failure(item.id, reason, GENERATION_ERROR_FALLBACK)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for ProcessingLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingLoop")
            .field("instance_id", &self.claims.instance_id())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

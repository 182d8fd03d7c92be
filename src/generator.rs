//! Collaborator traits at the rendering boundary.
//!
//! The queue does not render anything itself. The processing loop resolves
//! a template code (or a wording path), hands the item to a
//! [`DocumentGenerator`], and records whatever the generator reports back.

use async_trait::async_trait;

use crate::schema::{DocumentType, QueueItem};

/// What a generator did with an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The document was produced synchronously and lives at the given
    /// location.
    Completed {
        /// Where the produced document was written.
        output_location: String,
    },
    /// Generation continues under an external asynchronous job; the job's
    /// completion path records the eventual success or failure.
    HandedOff {
        /// Correlation id of the external job.
        background_job_id: i64,
        /// Template code the job renders from.
        document_code: String,
    },
}

/// The rendering engine. Template resolution and PDF production live behind
/// this trait; the queue only cares about the reported outcome.
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    /// Render the document for `item` from `template_code`.
    async fn generate(
        &self,
        item: &QueueItem,
        template_code: &str,
    ) -> anyhow::Result<GenerationOutcome>;
}

/// Template resolution service for every document type except `Wording`.
#[async_trait]
pub trait TemplateLookup: Send + Sync {
    /// Resolve the template code for the given business context. `None` or
    /// an empty code means no template is configured.
    async fn template_code(
        &self,
        insurance_ref: &str,
        insurance_file_type_code: &str,
        document_type: DocumentType,
    ) -> anyhow::Result<Option<String>>;

    /// Whether the template artifact behind `template_code` actually exists.
    async fn template_exists(&self, template_code: &str) -> anyhow::Result<bool>;
}

/// Reference-data lookup for the `Wording` path.
#[async_trait]
pub trait WordingResolver: Send + Sync {
    /// Wording code for the insurance file.
    async fn wording_code(&self, insurance_file_key: i32) -> anyhow::Result<String>;

    /// Output path for a wording document.
    fn wording_path(&self, wording_code: &str, policy_type: &str) -> String;
}

/// Policy type encoded in an insurance reference: its leading alphabetic
/// prefix (`"HH1234"` is policy type `"HH"`).
pub fn policy_type(insurance_ref: &str) -> &str {
    let end = insurance_ref
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(insurance_ref.len());
    &insurance_ref[..end]
}

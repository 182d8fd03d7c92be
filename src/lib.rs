#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod claim;
mod errors;
mod generator;
mod memory;
mod recorder;
mod runner;
/// Queue row types and policy constants.
pub mod schema;
mod status;
mod storage;
mod store;

/// Batch claiming pinned to one worker instance.
pub use self::claim::ClaimCoordinator;
/// Error types for enqueueing and store operations.
pub use self::errors::{EnqueueError, QueueError};
/// Collaborator traits at the rendering boundary.
pub use self::generator::{
    policy_type, DocumentGenerator, GenerationOutcome, TemplateLookup, WordingResolver,
};
/// In-process store for tests and embedding.
pub use self::memory::MemoryQueueStore;
/// Outcome recording with dead-letter escalation.
pub use self::recorder::ResultRecorder;
/// The processing loop and its failure placeholder.
pub use self::runner::{ProcessingLoop, GENERATION_ERROR_FALLBACK};
/// Read-only status checks.
pub use self::status::StatusQuery;
/// Postgres-backed store.
pub use self::storage::PgQueueStore;
/// The store interface and recording outcomes.
pub use self::store::{QueueStore, RecordOutcome};

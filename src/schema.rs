//! Queue row types and policy constants.
//!
//! One row per document generation request; the table is the only shared
//! mutable resource between worker instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Retry budget for a queue item.
///
/// An item that fails this many times is *exhausted*: it is never claimed
/// again and stays in the table as a dead letter for manual handling.
pub const MAX_ATTEMPTS: i32 = 3;

/// Which rendering path an item takes.
///
/// `Wording` is the odd one out: its output path is resolved from reference
/// data and recorded directly, without any template lookup. Every other
/// variant goes through template resolution first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum DocumentType {
    /// Policy wording; output path comes from reference data, no template.
    Wording = 0,
    /// Policy schedule.
    Schedule = 1,
    /// Certificate of insurance.
    Certificate = 2,
    /// Invoice.
    Invoice = 3,
    /// Renewal notice.
    Renewal = 4,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DocumentType::Wording => "Wording",
            DocumentType::Schedule => "Schedule",
            DocumentType::Certificate => "Certificate",
            DocumentType::Invoice => "Invoice",
            DocumentType::Renewal => "Renewal",
        };
        f.write_str(name)
    }
}

/// A generation request waiting in (or finished with) the queue.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QueueItem {
    /// Unique identifier, assigned at creation.
    pub id: i64,
    /// Business reference of the source insurance record.
    pub insurance_ref: String,
    /// Key of the insurance file this document belongs to.
    pub insurance_file_key: i32,
    /// Key of the containing insurance folder.
    pub insurance_folder_key: i32,
    /// Type code of the insurance file.
    pub insurance_file_type_code: String,
    /// Owning client.
    pub client_id: i32,
    /// Rendering path selector.
    pub document_type: DocumentType,
    /// True once the document was produced; terminal.
    pub generated: bool,
    /// Completed processing attempts, successful or not.
    pub attempts: i32,
    /// Worker instance currently holding the claim; `None` means unclaimed.
    pub owner_tag: Option<String>,
    /// Correlation id of an external asynchronous generation job.
    pub background_job_id: Option<i64>,
    /// When the request was enqueued.
    pub created_at: DateTime<Utc>,
    /// When generation succeeded; `None` until then.
    pub generated_at: Option<DateTime<Utc>>,
    /// Processing duration of the successful attempt, in milliseconds.
    pub duration_ms: Option<i64>,
    /// Template code the document was (or would have been) rendered from.
    pub document_code: Option<String>,
    /// Where the produced document (or the failure placeholder) lives.
    pub output_location: Option<String>,
    /// User who requested the document.
    #[sqlx(rename = "submitted_by")]
    pub user: String,
    /// Why the most recent attempt failed, if it did.
    pub failure_reason: Option<String>,
    /// Instance that accepted the enqueue; informational only.
    pub server_issued: String,
}

impl QueueItem {
    /// Whether the retry budget is spent without a successful generation.
    pub fn is_exhausted(&self) -> bool {
        !self.generated && self.attempts >= MAX_ATTEMPTS
    }

    /// Whether the item permits no further mutation.
    pub fn is_terminal(&self) -> bool {
        self.generated || self.attempts >= MAX_ATTEMPTS
    }
}

/// Payload for enqueueing a new generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueueItem {
    /// Business reference of the source insurance record.
    pub insurance_ref: String,
    /// Key of the insurance file this document belongs to.
    pub insurance_file_key: i32,
    /// Key of the containing insurance folder.
    pub insurance_folder_key: i32,
    /// Type code of the insurance file.
    pub insurance_file_type_code: String,
    /// Owning client.
    pub client_id: i32,
    /// Rendering path selector.
    pub document_type: DocumentType,
    /// User who requested the document.
    pub user: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(generated: bool, attempts: i32) -> QueueItem {
        QueueItem {
            id: 1,
            insurance_ref: "QBE-HH-1".into(),
            insurance_file_key: 1,
            insurance_folder_key: 1,
            insurance_file_type_code: "NB".into(),
            client_id: 1,
            document_type: DocumentType::Schedule,
            generated,
            attempts,
            owner_tag: None,
            background_job_id: None,
            created_at: Utc::now(),
            generated_at: None,
            duration_ms: None,
            document_code: None,
            output_location: None,
            user: "test".into(),
            failure_reason: None,
            server_issued: "local".into(),
        }
    }

    #[test]
    fn exhausted_requires_spent_budget_without_success() {
        assert!(!item(false, 0).is_exhausted());
        assert!(!item(false, MAX_ATTEMPTS - 1).is_exhausted());
        assert!(item(false, MAX_ATTEMPTS).is_exhausted());
        assert!(!item(true, MAX_ATTEMPTS).is_exhausted());
    }

    #[test]
    fn generated_items_are_terminal() {
        assert!(item(true, 1).is_terminal());
        assert!(item(false, MAX_ATTEMPTS).is_terminal());
        assert!(!item(false, 1).is_terminal());
    }
}

use async_trait::async_trait;
use futures::stream::BoxStream;
use psry_core::{ProcessingRecord, RecordId, StageUpdate};

use crate::error::RecordStoreResult;

/// Number of records fetched per page by `scan_all`.
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Lazy, finite stream over every record. Pages are fetched as the stream is polled.
pub type RecordStream = BoxStream<'static, RecordStoreResult<ProcessingRecord>>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one record. Missing IDs yield `RecordStoreError::NotFound`.
    async fn get(&self, id: &RecordId) -> RecordStoreResult<ProcessingRecord>;

    /// Create or overwrite a record.
    async fn put(&self, record: &ProcessingRecord) -> RecordStoreResult<()>;

    /// Write one stage payload together with its stage, in a single conditional update.
    ///
    /// The update applies only when the record has reached the predecessor of the update's
    /// stage; the stored stage becomes `max(current, target)`. Returns the updated record.
    async fn update(&self, id: &RecordId, update: StageUpdate)
        -> RecordStoreResult<ProcessingRecord>;

    /// Enumerate all records, unordered.
    fn scan_all(&self) -> RecordStream;

    /// Cheap connectivity check used by health endpoints.
    async fn ping(&self) -> RecordStoreResult<()> {
        Ok(())
    }
}

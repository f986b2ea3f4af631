//! Retrieval handlers

use futures::TryStreamExt;
use psry_core::{PipelineError, ProcessingRecord, RecordId};
use psry_db::RecordStore;
use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::with_timeout;

#[derive(Clone)]
pub struct RetrievalHandler {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl RetrievalHandler {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn get_one(&self, id: &RecordId) -> Result<ProcessingRecord, PipelineError> {
        with_timeout("get_record", self.timeout, self.store.get(id)).await
    }

    /// Every record, fully materialized. Order is unspecified.
    ///
    /// The timeout covers the whole scan, not each page.
    pub async fn get_all(&self) -> Result<Vec<ProcessingRecord>, PipelineError> {
        let records: Vec<ProcessingRecord> = with_timeout(
            "scan_records",
            self.timeout,
            self.store.scan_all().try_collect::<Vec<_>>(),
        )
        .await?;
        tracing::debug!(count = records.len(), "Listed records");
        Ok(records)
    }
}

//! In-memory record store with the same semantics as the PostgreSQL adapter.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use psry_core::{ProcessingRecord, RecordId, StageUpdate};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{RecordStoreError, RecordStoreResult};
use crate::store::{RecordStore, RecordStream, DEFAULT_PAGE_SIZE};

/// Record store backed by a shared ordered map. Clones share the same records.
#[derive(Clone)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<RecordId, ProcessingRecord>>>,
    page_size: usize,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            page_size: DEFAULT_PAGE_SIZE as usize,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, id: &RecordId) -> RecordStoreResult<ProcessingRecord> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RecordStoreError::NotFound(id.clone()))
    }

    async fn put(&self, record: &ProcessingRecord) -> RecordStoreResult<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(
        &self,
        id: &RecordId,
        update: StageUpdate,
    ) -> RecordStoreResult<ProcessingRecord> {
        // Holding the write lock across check and write makes the update atomic.
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| RecordStoreError::NotFound(id.clone()))?;

        record
            .apply(update)
            .map_err(|e| RecordStoreError::StageConflict {
                id: id.clone(),
                current: e.current,
                requested: e.requested,
            })?;

        Ok(record.clone())
    }

    fn scan_all(&self) -> RecordStream {
        let records = Arc::clone(&self.records);
        let page_size = self.page_size;

        // Keyset pagination over the ordered map, one page per poll.
        stream::try_unfold(Some(None::<RecordId>), move |cursor| {
            let records = Arc::clone(&records);
            async move {
                let Some(after) = cursor else {
                    return Ok(None);
                };

                let guard = records.read().await;
                let lower = match &after {
                    Some(id) => Bound::Excluded(id.clone()),
                    None => Bound::Unbounded,
                };
                let page: Vec<ProcessingRecord> = guard
                    .range((lower, Bound::Unbounded))
                    .take(page_size)
                    .map(|(_, record)| record.clone())
                    .collect();

                if page.is_empty() {
                    return Ok(None);
                }

                let next = if page.len() < page_size {
                    None
                } else {
                    page.last().map(|record| Some(record.id.clone()))
                };
                Ok::<_, RecordStoreError>(Some((page, next)))
            }
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psry_core::{FaceSummary, ProcessStage};
    use std::collections::{BTreeMap, HashSet};

    fn record(id: &str) -> ProcessingRecord {
        ProcessingRecord::uploaded(
            RecordId::new(id),
            "a.png",
            format!("https://s3.us-east-1.amazonaws.com/bucket/{}", id),
        )
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = InMemoryRecordStore::new();
        let err = store.get(&RecordId::new("missing.png")).await.unwrap_err();
        assert!(matches!(err, RecordStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = InMemoryRecordStore::new();
        let err = store
            .update(
                &RecordId::new("missing.png"),
                StageUpdate::FaceDetected(vec![]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecordStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_advances_stage_with_payload() {
        let store = InMemoryRecordStore::new();
        store.put(&record("a.png")).await.unwrap();

        let updated = store
            .update(&RecordId::new("a.png"), StageUpdate::FaceDetected(vec![]))
            .await
            .unwrap();
        assert_eq!(updated.process_stage, ProcessStage::FaceDetected);
        assert_eq!(updated.face_detection, Some(vec![]));
        assert_eq!(store.get(&updated.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn out_of_order_update_is_a_conflict() {
        let store = InMemoryRecordStore::new();
        store.put(&record("a.png")).await.unwrap();

        let err = store
            .update(
                &RecordId::new("a.png"),
                StageUpdate::TextTranslated(BTreeMap::new()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecordStoreError::StageConflict {
                current: ProcessStage::Uploaded,
                requested: ProcessStage::TextTranslated,
                ..
            }
        ));
        let stored = store.get(&RecordId::new("a.png")).await.unwrap();
        assert_eq!(stored.process_stage, ProcessStage::Uploaded);
        assert!(stored.translations.is_none());
    }

    #[tokio::test]
    async fn rerunning_earlier_stage_keeps_later_stage() {
        let store = InMemoryRecordStore::new();
        let id = RecordId::new("a.png");
        store.put(&record("a.png")).await.unwrap();
        store
            .update(&id, StageUpdate::FaceDetected(vec![]))
            .await
            .unwrap();
        store
            .update(&id, StageUpdate::TextProcessed("hi".into()))
            .await
            .unwrap();

        let faces = vec![FaceSummary::malformed("missing Smile")];
        let updated = store
            .update(&id, StageUpdate::FaceDetected(faces.clone()))
            .await
            .unwrap();
        assert_eq!(updated.process_stage, ProcessStage::TextProcessed);
        assert_eq!(updated.face_detection, Some(faces));
        assert_eq!(updated.image_text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn scan_all_crosses_pages_without_duplicates() {
        let store = InMemoryRecordStore::new().with_page_size(3);
        for i in 0..10 {
            store.put(&record(&format!("{:02}.png", i))).await.unwrap();
        }

        let records: Vec<ProcessingRecord> = store.scan_all().try_collect().await.unwrap();
        let ids: HashSet<String> = records.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(records.len(), 10);
        assert_eq!(ids.len(), 10);
    }

    #[tokio::test]
    async fn scan_all_on_exact_page_multiple_terminates() {
        let store = InMemoryRecordStore::new().with_page_size(2);
        for i in 0..4 {
            store.put(&record(&format!("{}.png", i))).await.unwrap();
        }
        let records: Vec<ProcessingRecord> = store.scan_all().try_collect().await.unwrap();
        assert_eq!(records.len(), 4);
    }

    #[tokio::test]
    async fn scan_all_on_empty_store_is_empty() {
        let store = InMemoryRecordStore::new();
        let records: Vec<ProcessingRecord> = store.scan_all().try_collect().await.unwrap();
        assert!(records.is_empty());
    }
}

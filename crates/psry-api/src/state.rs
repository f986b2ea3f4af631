//! Application state shared by every handler.

use psry_db::RecordStore;
use psry_pipeline::{RetrievalHandler, UploadStage};
use psry_storage::Storage;
use std::sync::Arc;

pub struct AppState {
    pub upload: UploadStage,
    pub retrieval: RetrievalHandler,
    pub store: Arc<dyn RecordStore>,
    pub storage: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn Storage>,
        max_upload_bytes: usize,
        service_timeout: std::time::Duration,
    ) -> Self {
        Self {
            upload: UploadStage::new(
                storage.clone(),
                store.clone(),
                max_upload_bytes,
                service_timeout,
            ),
            retrieval: RetrievalHandler::new(store.clone(), service_timeout),
            store,
            storage,
        }
    }
}

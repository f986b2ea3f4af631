use async_trait::async_trait;
use psry_core::{FilterConfig, ObjectLocation, PipelineError, RecordId, StageUpdate};
use psry_db::RecordStore;
use psry_detection::FaceDetector;
use std::sync::Arc;
use std::time::Duration;

use super::{handle_locations, StageHandler};
use crate::coordinator::{process_batch, with_timeout, BatchReport, Delivery};
use crate::filter::filter_faces;
use crate::handoff::{encode, parse_object_locations, HandOffPublisher, StageKind};

/// Detects faces in newly stored images and hands the image on to text extraction.
pub struct FaceDetectionStage {
    detector: Arc<dyn FaceDetector>,
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn HandOffPublisher>,
    filter: FilterConfig,
    timeout: Duration,
    concurrency: usize,
}

impl FaceDetectionStage {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        store: Arc<dyn RecordStore>,
        publisher: Arc<dyn HandOffPublisher>,
        filter: FilterConfig,
        timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            detector,
            store,
            publisher,
            filter,
            timeout,
            concurrency,
        }
    }

    #[tracing::instrument(skip(self), fields(stage = "face_detection"))]
    pub async fn handle_location(&self, location: ObjectLocation) -> Result<(), PipelineError> {
        let id = RecordId::new(location.key.clone());

        let raw = with_timeout(
            "detect_faces",
            self.timeout,
            self.detector.detect_faces(&location),
        )
        .await?;
        let faces = filter_faces(&raw, &self.filter);
        let face_count = faces.len();

        let record = with_timeout(
            "update_record",
            self.timeout,
            self.store.update(&id, StageUpdate::FaceDetected(faces)),
        )
        .await?;

        with_timeout(
            "publish_handoff",
            self.timeout,
            self.publisher
                .publish(StageKind::TextExtraction, encode(&location)?),
        )
        .await?;

        tracing::info!(
            record_id = %id,
            face_count,
            process_stage = %record.process_stage,
            "Faces detected"
        );
        Ok(())
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<(), PipelineError> {
        let locations = parse_object_locations(&delivery.body)?;
        handle_locations(locations, |location| self.handle_location(location)).await
    }
}

#[async_trait]
impl StageHandler for FaceDetectionStage {
    fn stage(&self) -> StageKind {
        StageKind::FaceDetection
    }

    async fn handle_batch(&self, deliveries: Vec<Delivery>) -> BatchReport {
        process_batch(self.stage(), deliveries, self.concurrency, |delivery| {
            self.handle_delivery(delivery)
        })
        .await
    }
}

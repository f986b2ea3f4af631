use async_trait::async_trait;
use psry_core::{FilterConfig, ObjectLocation, PipelineError, RecordId, StageUpdate};
use psry_db::RecordStore;
use psry_detection::TextDetector;
use std::sync::Arc;
use std::time::Duration;

use super::{handle_locations, StageHandler};
use crate::coordinator::{process_batch, with_timeout, BatchReport, Delivery};
use crate::filter::filter_text;
use crate::handoff::{encode, parse_object_locations, HandOffPublisher, StageKind, TranslationRequest};

/// Extracts line text from images whose faces have been detected and hands the text on
/// to translation.
pub struct TextExtractionStage {
    detector: Arc<dyn TextDetector>,
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn HandOffPublisher>,
    filter: FilterConfig,
    timeout: Duration,
    concurrency: usize,
}

impl TextExtractionStage {
    pub fn new(
        detector: Arc<dyn TextDetector>,
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

    #[tracing::instrument(skip(self), fields(stage = "text_extraction"))]
    pub async fn handle_location(&self, location: ObjectLocation) -> Result<(), PipelineError> {
        let id = RecordId::new(location.key.clone());

        let detections = with_timeout(
            "detect_text",
            self.timeout,
            self.detector.detect_text(&location),
        )
        .await?;
        let text = filter_text(
            &detections,
            self.filter.line_confidence_threshold,
            &self.filter.line_delimiter,
        );

        with_timeout(
            "update_record",
            self.timeout,
            self.store
                .update(&id, StageUpdate::TextProcessed(text.clone())),
        )
        .await?;

        let text_length = text.len();
        let request = TranslationRequest { id: id.clone(), text };
        with_timeout(
            "publish_handoff",
            self.timeout,
            self.publisher
                .publish(StageKind::Translation, encode(&request)?),
        )
        .await?;

        tracing::info!(record_id = %id, text_length, "Text extracted");
        Ok(())
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<(), PipelineError> {
        let locations = parse_object_locations(&delivery.body)?;
        handle_locations(locations, |location| self.handle_location(location)).await
    }
}

#[async_trait]
impl StageHandler for TextExtractionStage {
    fn stage(&self) -> StageKind {
        StageKind::TextExtraction
    }

    async fn handle_batch(&self, deliveries: Vec<Delivery>) -> BatchReport {
        process_batch(self.stage(), deliveries, self.concurrency, |delivery| {
            self.handle_delivery(delivery)
        })
        .await
    }
}

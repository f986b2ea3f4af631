//! Stage handlers
//!
//! Each handler receives its collaborators as `Arc<dyn Trait>` so tests can swap in fakes.

mod face_detection;
mod text_extraction;
mod translation;
mod upload;

pub use face_detection::FaceDetectionStage;
pub use text_extraction::TextExtractionStage;
pub use translation::TranslationStage;
pub use upload::{UploadRequest, UploadResponse, UploadStage};

use async_trait::async_trait;
use psry_core::{ObjectLocation, PipelineError};
use std::future::Future;

use crate::coordinator::{BatchReport, Delivery};
use crate::handoff::StageKind;

/// A stage consuming one hand-off queue.
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> StageKind;

    async fn handle_batch(&self, deliveries: Vec<Delivery>) -> BatchReport;
}

/// Process every location of one message. All locations are attempted; the message fails
/// with the first recoverable error if any, otherwise with the first permanent one.
pub(crate) async fn handle_locations<F, Fut>(
    locations: Vec<ObjectLocation>,
    handle: F,
) -> Result<(), PipelineError>
where
    F: Fn(ObjectLocation) -> Fut,
    Fut: Future<Output = Result<(), PipelineError>>,
{
    let mut recoverable = None;
    let mut permanent = None;
    for location in locations {
        if let Err(err) = handle(location).await {
            if err.is_recoverable() {
                recoverable.get_or_insert(err);
            } else {
                permanent.get_or_insert(err);
            }
        }
    }

    match recoverable.or(permanent) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

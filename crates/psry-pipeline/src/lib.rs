//! psry pipeline
//!
//! Four stages move an uploaded image through the pipeline:
//!
//! ```text
//! upload ──► uploaded ──(object created)──► face detection ──► face_detected
//!        ──(hand-off)──► text extraction ──► text_processed
//!        ──(hand-off)──► translation ──► text_translated
//! ```
//!
//! Stages never call each other. Each consumes hand-off messages in batches through
//! [`StageHandler::handle_batch`], and every write goes through the record store's
//! conditional update.

pub mod coordinator;
pub mod filter;
pub mod handoff;
pub mod retrieval;
pub mod stages;

pub use coordinator::{process_batch, with_timeout, BatchReport, Delivery, ItemOutcome};
pub use filter::{filter_face, filter_faces, filter_text};
pub use handoff::{
    parse_object_locations, parse_translation_request, HandOffPublisher, StageKind,
    TranslationRequest,
};
pub use retrieval::RetrievalHandler;
pub use stages::{
    FaceDetectionStage, StageHandler, TextExtractionStage, TranslationStage, UploadRequest,
    UploadResponse, UploadStage,
};

//! psry Core Library
//!
//! This crate provides the domain models, the stage state machine, error types and
//! configuration shared by every psry component.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline_error;
pub mod storage_types;
#[cfg(feature = "telemetry")]
pub mod telemetry;

// Re-export commonly used types
pub use config::{Config, FilterConfig, PipelineConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    validate_transition, AttributeValue, Detection, EmotionScore, FaceSummary, LanguageScore,
    ObjectLocation, ProcessStage, ProcessingRecord, RawFaceDetail, RecordId, StageUpdate,
    TextDetection, TextDetectionKind, TransitionError,
};
pub use pipeline_error::PipelineError;
pub use storage_types::{RecordStoreBackend, StorageBackend, TransportBackend, Visibility};

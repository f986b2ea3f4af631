//! Stage-level error taxonomy
//!
//! Every per-item failure inside a stage handler is reported as a `PipelineError`. The batch
//! coordinator uses [`PipelineError::is_recoverable`] to decide whether the hand-off message is
//! acknowledged (logged and dropped) or left on the transport for redelivery.

use crate::models::{ProcessStage, RecordId};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed caller input. Surfaced to the caller as a client error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The record targeted by an update does not exist.
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Detection service error ({service}): {message}")]
    DetectionService {
        service: &'static str,
        message: String,
        /// Throttling or server-side failure reported by the adapter.
        retryable: bool,
    },

    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Hand-off message missing expected fields.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The record has not reached the stage this update depends on.
    #[error("Stage conflict for {id}: cannot move from {current} to {requested}")]
    StageConflict {
        id: RecordId,
        current: ProcessStage,
        requested: ProcessStage,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Record store error: {0}")]
    RecordStore(String),

    #[error("Hand-off transport error: {0}")]
    Transport(String),
}

impl PipelineError {
    /// Whether the transport should redeliver the message that produced this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PipelineError::Validation(_)
            | PipelineError::NotFound(_)
            | PipelineError::MalformedPayload(_) => false,
            PipelineError::DetectionService { retryable, .. } => *retryable,
            PipelineError::Timeout { .. }
            | PipelineError::StageConflict { .. }
            | PipelineError::Storage(_)
            | PipelineError::RecordStore(_)
            | PipelineError::Transport(_) => true,
        }
    }

    /// Taxonomy name used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::NotFound(_) => "NotFoundError",
            PipelineError::DetectionService { .. } => "DetectionServiceError",
            PipelineError::Timeout { .. } => "TimeoutError",
            PipelineError::MalformedPayload(_) => "MalformedPayloadError",
            PipelineError::StageConflict { .. } => "StageConflictError",
            PipelineError::Storage(_) => "StorageError",
            PipelineError::RecordStore(_) => "RecordStoreError",
            PipelineError::Transport(_) => "TransportError",
        }
    }

    pub fn detection(service: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        PipelineError::DetectionService {
            service,
            message: message.into(),
            retryable,
        }
    }
}

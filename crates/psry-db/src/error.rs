use psry_core::{PipelineError, ProcessStage, RecordId};

#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Record {id} is at {current}; {requested} cannot be written yet")]
    StageConflict {
        id: RecordId,
        current: ProcessStage,
        requested: ProcessStage,
    },

    #[error("Record store error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

pub type RecordStoreResult<T> = Result<T, RecordStoreError>;

impl From<RecordStoreError> for PipelineError {
    fn from(err: RecordStoreError) -> Self {
        match err {
            RecordStoreError::NotFound(id) => PipelineError::NotFound(id),
            RecordStoreError::StageConflict {
                id,
                current,
                requested,
            } => PipelineError::StageConflict {
                id,
                current,
                requested,
            },
            RecordStoreError::Backend(e) => PipelineError::RecordStore(format!("{:#}", e)),
        }
    }
}

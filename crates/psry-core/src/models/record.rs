//! Processing record: the per-image row that tracks pipeline progress and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use super::face::FaceSummary;
use super::stage::{validate_transition, ProcessStage, TransitionError};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];
const DEFAULT_EXTENSION: &str = "png";

/// Opaque record identifier. Also the object-store key of the uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh identifier `<uuid-v4>.<ext>`, keeping the extension of `file_name` when it is a
    /// known image extension.
    pub fn generate(file_name: &str) -> Self {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

        Self(format!("{}.{}", Uuid::new_v4(), extension))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessingRecord {
    #[serde(rename = "ID")]
    pub id: RecordId,
    pub file_name: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub process_stage: ProcessStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_detection: Option<Vec<FaceSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translations: Option<BTreeMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingRecord {
    /// New record at `uploaded` with no stage payloads.
    pub fn uploaded(id: RecordId, file_name: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            file_name: file_name.into(),
            url: url.into(),
            process_stage: ProcessStage::Uploaded,
            face_detection: None,
            image_text: None,
            translations: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a stage update in place: validates the transition, replaces the stage's field and
    /// advances `process_stage`. On error the record is left untouched.
    pub fn apply(&mut self, update: StageUpdate) -> Result<(), TransitionError> {
        let stage = validate_transition(self.process_stage, update.target_stage())?;

        match update {
            StageUpdate::FaceDetected(faces) => self.face_detection = Some(faces),
            StageUpdate::TextProcessed(text) => self.image_text = Some(text),
            StageUpdate::TextTranslated(translations) => self.translations = Some(translations),
        }
        self.process_stage = stage;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Payload of one stage write. Each variant owns exactly one record field and names the stage
/// written together with it.
#[derive(Debug, Clone, PartialEq)]
pub enum StageUpdate {
    FaceDetected(Vec<FaceSummary>),
    TextProcessed(String),
    TextTranslated(BTreeMap<String, String>),
}

impl StageUpdate {
    pub fn target_stage(&self) -> ProcessStage {
        match self {
            StageUpdate::FaceDetected(_) => ProcessStage::FaceDetected,
            StageUpdate::TextProcessed(_) => ProcessStage::TextProcessed,
            StageUpdate::TextTranslated(_) => ProcessStage::TextTranslated,
        }
    }
}

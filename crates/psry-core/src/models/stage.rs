//! Pipeline stage state machine
//!
//! `ProcessStage` is totally ordered in pipeline order. Every stage handler moves a record
//! through [`validate_transition`], which is also mirrored by the conditional update in the
//! PostgreSQL record store.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Furthest stage a record has reached.
///
/// Variant order is pipeline order; the derived `Ord` is relied upon by the transition rule
/// and matches the declaration order of the `process_stage` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "process_stage", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStage {
    Uploaded,
    #[serde(alias = "facedetected", alias = "face-detected")]
    FaceDetected,
    #[serde(alias = "text_extracted", alias = "textprocessed", alias = "text-processed")]
    TextProcessed,
    #[serde(alias = "texttranslated", alias = "text-translated")]
    TextTranslated,
}

impl ProcessStage {
    pub const ALL: [ProcessStage; 4] = [
        ProcessStage::Uploaded,
        ProcessStage::FaceDetected,
        ProcessStage::TextProcessed,
        ProcessStage::TextTranslated,
    ];

    /// Stage that must have completed before this one may be written.
    ///
    /// `Uploaded` has no predecessor: it is only ever written when the record is created.
    pub fn predecessor(self) -> Option<ProcessStage> {
        match self {
            ProcessStage::Uploaded => None,
            ProcessStage::FaceDetected => Some(ProcessStage::Uploaded),
            ProcessStage::TextProcessed => Some(ProcessStage::FaceDetected),
            ProcessStage::TextTranslated => Some(ProcessStage::TextProcessed),
        }
    }

    pub fn successor(self) -> Option<ProcessStage> {
        match self {
            ProcessStage::Uploaded => Some(ProcessStage::FaceDetected),
            ProcessStage::FaceDetected => Some(ProcessStage::TextProcessed),
            ProcessStage::TextProcessed => Some(ProcessStage::TextTranslated),
            ProcessStage::TextTranslated => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStage::Uploaded => "uploaded",
            ProcessStage::FaceDetected => "face_detected",
            ProcessStage::TextProcessed => "text_processed",
            ProcessStage::TextTranslated => "text_translated",
        }
    }
}

impl Display for ProcessStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uploaded" => Ok(ProcessStage::Uploaded),
            "face_detected" | "facedetected" | "face-detected" => Ok(ProcessStage::FaceDetected),
            "text_processed" | "textprocessed" | "text-processed" | "text_extracted" => {
                Ok(ProcessStage::TextProcessed)
            }
            "text_translated" | "texttranslated" | "text-translated" => {
                Ok(ProcessStage::TextTranslated)
            }
            _ => Err(anyhow::anyhow!("Invalid process stage: {}", s)),
        }
    }
}

/// Rejected stage move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move from {current} to {requested}")]
pub struct TransitionError {
    pub current: ProcessStage,
    pub requested: ProcessStage,
}

/// Decide whether `requested` may be written over a record currently at `current`.
///
/// The write is legal when the record has reached at least the predecessor of `requested`.
/// The returned stage is the one to persist: `max(current, requested)`, so re-running an
/// earlier stage after a later one has completed never regresses progress.
pub fn validate_transition(
    current: ProcessStage,
    requested: ProcessStage,
) -> Result<ProcessStage, TransitionError> {
    let allowed = match requested.predecessor() {
        Some(predecessor) => current >= predecessor,
        None => false,
    };

    if allowed {
        Ok(current.max(requested))
    } else {
        Err(TransitionError { current, requested })
    }
}

//! Text and language detection models, plus the object-store location passed between stages.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Granularity of a text detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDetectionKind {
    Line,
    Word,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetection {
    #[serde(rename = "type")]
    pub kind: TextDetectionKind,
    pub text: String,
    /// Confidence on the 0-100 scale.
    pub confidence: f32,
}

impl TextDetection {
    pub fn line(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            kind: TextDetectionKind::Line,
            text: text.into(),
            confidence,
        }
    }

    pub fn word(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            kind: TextDetectionKind::Word,
            text: text.into(),
            confidence,
        }
    }
}

/// One entry of a language-identification ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageScore {
    pub language_code: String,
    /// Confidence on the 0-100 scale; adapters rescale services that report 0-1.
    pub confidence: f32,
}

impl LanguageScore {
    pub fn new(language_code: impl Into<String>, confidence: f32) -> Self {
        Self {
            language_code: language_code.into(),
            confidence,
        }
    }
}

/// Bucket + key of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl Display for ObjectLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

use async_trait::async_trait;
use psry_core::{LanguageScore, ObjectLocation, RawFaceDetail, TextDetection};

use crate::error::DetectionResult;

/// Detects faces and their attributes in a stored image.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// One entry per face, in service order. Confidences are on the 0-100 scale.
    async fn detect_faces(&self, location: &ObjectLocation) -> DetectionResult<Vec<RawFaceDetail>>;
}

/// Detects text in a stored image.
#[async_trait]
pub trait TextDetector: Send + Sync {
    /// Line and word detections, in service order.
    async fn detect_text(&self, location: &ObjectLocation) -> DetectionResult<Vec<TextDetection>>;
}

/// Identifies the languages of a text.
#[async_trait]
pub trait LanguageIdentifier: Send + Sync {
    /// Candidate languages ranked by descending confidence.
    async fn detect_languages(&self, text: &str) -> DetectionResult<Vec<LanguageScore>>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> DetectionResult<String>;
}

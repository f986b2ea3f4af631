//! Confidence filter
//!
//! Pure threshold policy applied to raw detection output. A value is kept only when its
//! confidence is strictly greater than the threshold.

use psry_core::{
    AttributeValue, Detection, FaceSummary, FilterConfig, RawFaceDetail, TextDetection,
    TextDetectionKind,
};

/// Filter one face. Malformed input yields a summary with `Error` set and every attribute
/// `Unknown` instead of failing.
pub fn filter_face(raw: &RawFaceDetail, config: &FilterConfig) -> FaceSummary {
    try_filter_face(raw, config).unwrap_or_else(FaceSummary::malformed)
}

/// Filter every face, one summary per input face, order preserved.
pub fn filter_faces(raw: &[RawFaceDetail], config: &FilterConfig) -> Vec<FaceSummary> {
    raw.iter().map(|face| filter_face(face, config)).collect()
}

/// Join the text of every line detection above `threshold`, in detection order.
///
/// Word detections and low-confidence lines are dropped. Line text is not trimmed.
pub fn filter_text(detections: &[TextDetection], threshold: f32, delimiter: &str) -> String {
    detections
        .iter()
        .filter(|d| d.kind == TextDetectionKind::Line && d.confidence > threshold)
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join(delimiter)
}

fn try_filter_face(raw: &RawFaceDetail, config: &FilterConfig) -> Result<FaceSummary, String> {
    let smile = require("Smile", &raw.smile)?;
    let gender = require("Gender", &raw.gender)?;
    let eyes_open = require("EyesOpen", &raw.eyes_open)?;
    let beard = require("Beard", &raw.beard)?;

    for emotion in &raw.emotions {
        check_confidence(&format!("emotion {}", emotion.emotion), emotion.confidence)?;
    }

    Ok(FaceSummary {
        smile: gate(smile, config.smile_threshold),
        gender: gate(gender, config.gender_threshold),
        eyes_open: gate(eyes_open, config.eyes_open_threshold),
        beard: gate(beard, config.beard_threshold),
        emotions: raw
            .emotions
            .iter()
            .filter(|e| e.confidence > config.emotion_threshold)
            .map(|e| e.emotion.clone())
            .collect(),
        error: None,
    })
}

fn require<'a, T>(name: &str, detection: &'a Option<Detection<T>>) -> Result<&'a Detection<T>, String> {
    let detection = detection
        .as_ref()
        .ok_or_else(|| format!("missing {} attribute", name))?;
    check_confidence(name, detection.confidence)?;
    Ok(detection)
}

fn check_confidence(name: &str, confidence: f32) -> Result<(), String> {
    if confidence.is_finite() && (0.0..=100.0).contains(&confidence) {
        Ok(())
    } else {
        Err(format!("{} confidence {} is outside 0-100", name, confidence))
    }
}

fn gate<T>(detection: &Detection<T>, threshold: f32) -> AttributeValue
where
    T: Clone + Into<AttributeValue>,
{
    if detection.confidence > threshold {
        detection.value.clone().into()
    } else {
        AttributeValue::Unknown
    }
}

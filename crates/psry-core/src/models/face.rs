//! Face detection models: raw service output and the filtered per-face summary.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Sentinel written for attributes whose confidence did not clear the threshold.
pub const UNKNOWN: &str = "Unknown";

/// A detected value with the service's confidence (0-100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection<T> {
    pub value: T,
    pub confidence: f32,
}

impl<T> Detection<T> {
    pub fn new(value: T, confidence: f32) -> Self {
        Self { value, confidence }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    /// Emotion label as reported by the service (e.g. "HAPPY").
    pub emotion: String,
    pub confidence: f32,
}

impl EmotionScore {
    pub fn new(emotion: impl Into<String>, confidence: f32) -> Self {
        Self {
            emotion: emotion.into(),
            confidence,
        }
    }
}

/// One face as reported by the face-detection service, before filtering.
///
/// Attributes are optional because the service may omit them; the confidence filter treats
/// a missing tracked attribute as malformed input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFaceDetail {
    pub smile: Option<Detection<bool>>,
    pub gender: Option<Detection<String>>,
    pub eyes_open: Option<Detection<bool>>,
    pub beard: Option<Detection<bool>>,
    #[serde(default)]
    pub emotions: Vec<EmotionScore>,
}

/// Filtered attribute value: the detected value, or `Unknown`.
///
/// Serializes as the bare value (`true`, `"Female"`) or the string `"Unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Bool(bool),
    Text(String),
    Unknown,
}

impl AttributeValue {
    pub fn is_unknown(&self) -> bool {
        matches!(self, AttributeValue::Unknown)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttributeValue::Bool(value) => serializer.serialize_bool(*value),
            AttributeValue::Text(value) => serializer.serialize_str(value),
            AttributeValue::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bool(bool),
            Text(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Bool(value) => AttributeValue::Bool(value),
            Repr::Text(value) if value == UNKNOWN => AttributeValue::Unknown,
            Repr::Text(value) => AttributeValue::Text(value),
        })
    }
}

/// Threshold-gated summary of one face, as stored on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FaceSummary {
    pub smile: AttributeValue,
    pub gender: AttributeValue,
    pub eyes_open: AttributeValue,
    pub beard: AttributeValue,
    /// Emotions above the emotion threshold, in service order (duplicates kept).
    #[serde(default)]
    pub emotions: Vec<String>,
    /// Set when this face's raw input was malformed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FaceSummary {
    /// Summary for a face whose input could not be filtered.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            smile: AttributeValue::Unknown,
            gender: AttributeValue::Unknown,
            eyes_open: AttributeValue::Unknown,
            beard: AttributeValue::Unknown,
            emotions: Vec::new(),
            error: Some(message.into()),
        }
    }
}

//! Hand-off messages between stages
//!
//! Message bodies are JSON. The face detection queue receives object-store event
//! notifications; every other queue receives the shapes defined here.

use async_trait::async_trait;
use psry_core::{ObjectLocation, PipelineError, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Stage that consumes a hand-off queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    FaceDetection,
    TextExtraction,
    Translation,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [
        StageKind::FaceDetection,
        StageKind::TextExtraction,
        StageKind::Translation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::FaceDetection => "face_detection",
            StageKind::TextExtraction => "text_extraction",
            StageKind::Translation => "translation",
        }
    }
}

impl Display for StageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Payload handed from text extraction to translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub id: RecordId,
    pub text: String,
}

/// Sends a message body to the queue consumed by `target`.
#[async_trait]
pub trait HandOffPublisher: Send + Sync {
    async fn publish(&self, target: StageKind, body: String) -> Result<(), PipelineError>;
}

#[derive(Deserialize)]
struct S3Event {
    #[serde(rename = "Records")]
    records: Vec<S3EventRecord>,
}

#[derive(Deserialize)]
struct S3EventRecord {
    s3: S3Entity,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Deserialize)]
struct S3Object {
    key: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LocationMessage {
    Event(S3Event),
    Location(ObjectLocation),
    /// Sent once by S3 when a notification is configured.
    TestEvent {
        #[serde(rename = "Event")]
        #[allow(dead_code)]
        event: String,
    },
}

/// Object locations named by a message: an S3 event notification, or a bare
/// `{"bucket", "key"}` hand-off.
pub fn parse_object_locations(body: &str) -> Result<Vec<ObjectLocation>, PipelineError> {
    let message: LocationMessage = serde_json::from_str(body).map_err(|e| {
        PipelineError::MalformedPayload(format!("expected object location or S3 event: {}", e))
    })?;

    match message {
        LocationMessage::Event(event) => event
            .records
            .into_iter()
            .map(|record| {
                let key = decode_event_key(&record.s3.object.key)?;
                validate_location(ObjectLocation::new(record.s3.bucket.name, key))
            })
            .collect(),
        LocationMessage::Location(location) => Ok(vec![validate_location(location)?]),
        LocationMessage::TestEvent { .. } => Ok(Vec::new()),
    }
}

pub fn parse_translation_request(body: &str) -> Result<TranslationRequest, PipelineError> {
    let request: TranslationRequest = serde_json::from_str(body).map_err(|e| {
        PipelineError::MalformedPayload(format!("expected {{id, text}}: {}", e))
    })?;

    if request.id.as_str().is_empty() {
        return Err(PipelineError::MalformedPayload("empty record id".to_string()));
    }
    Ok(request)
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, PipelineError> {
    serde_json::to_string(message)
        .map_err(|e| PipelineError::Transport(format!("failed to encode hand-off: {}", e)))
}

/// Event notification keys are form-encoded: `+` is a space.
fn decode_event_key(key: &str) -> Result<String, PipelineError> {
    urlencoding::decode(&key.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|e| PipelineError::MalformedPayload(format!("invalid object key {:?}: {}", key, e)))
}

fn validate_location(location: ObjectLocation) -> Result<ObjectLocation, PipelineError> {
    if location.bucket.is_empty() || location.key.is_empty() {
        return Err(PipelineError::MalformedPayload(
            "object location needs bucket and key".to_string(),
        ));
    }
    Ok(location)
}

//! Scripted detection services for tests
//!
//! Each fake answers from a table filled by the test, counts calls, and can be slowed
//! down to exercise timeouts. Nothing here talks to the network.

use async_trait::async_trait;
use psry_core::{LanguageScore, ObjectLocation, RawFaceDetail, TextDetection};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{DetectionError, DetectionResult};
use crate::traits::{FaceDetector, LanguageIdentifier, TextDetector, Translator};

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn missing_object(service: &'static str, location: &ObjectLocation) -> DetectionError {
    DetectionError::rejected(service, format!("object {} does not exist", location))
}

/// Face detector answering per object key.
#[derive(Default)]
pub struct ScriptedFaceDetector {
    responses: Mutex<HashMap<String, DetectionResult<Vec<RawFaceDetail>>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedFaceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faces(self, key: &str, faces: Vec<RawFaceDetail>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), Ok(faces));
        self
    }

    pub fn with_error(self, key: &str, error: DetectionError) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for ScriptedFaceDetector {
    async fn detect_faces(&self, location: &ObjectLocation) -> DetectionResult<Vec<RawFaceDetail>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        pause(self.delay).await;
        self.responses
            .lock()
            .unwrap()
            .get(&location.key)
            .cloned()
            .unwrap_or_else(|| Err(missing_object("rekognition", location)))
    }
}

/// Text detector answering per object key.
#[derive(Default)]
pub struct ScriptedTextDetector {
    responses: Mutex<HashMap<String, DetectionResult<Vec<TextDetection>>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedTextDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, key: &str, detections: Vec<TextDetection>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), Ok(detections));
        self
    }

    pub fn with_error(self, key: &str, error: DetectionError) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextDetector for ScriptedTextDetector {
    async fn detect_text(&self, location: &ObjectLocation) -> DetectionResult<Vec<TextDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        pause(self.delay).await;
        self.responses
            .lock()
            .unwrap()
            .get(&location.key)
            .cloned()
            .unwrap_or_else(|| Err(missing_object("rekognition", location)))
    }
}

/// Language identifier that reports one fixed language with full confidence.
pub struct FixedLanguageIdentifier {
    result: DetectionResult<Vec<LanguageScore>>,
    calls: AtomicUsize,
}

impl FixedLanguageIdentifier {
    pub fn new(language_code: &str) -> Self {
        Self {
            result: Ok(vec![LanguageScore::new(language_code, 99.0)]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: DetectionError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageIdentifier for FixedLanguageIdentifier {
    async fn detect_languages(&self, _text: &str) -> DetectionResult<Vec<LanguageScore>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Translator producing `"[<target>] <text>"`, with per-target failures.
#[derive(Default)]
pub struct TaggingTranslator {
    failing_targets: HashSet<String>,
    requests: Mutex<Vec<(String, String)>>,
}

impl TaggingTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, target: &str) -> Self {
        self.failing_targets.insert(target.to_string());
        self
    }

    /// `(source, target)` pairs in call order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Translator for TaggingTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> DetectionResult<String> {
        self.requests
            .lock()
            .unwrap()
            .push((source_language.to_string(), target_language.to_string()));

        if self.failing_targets.contains(target_language) {
            return Err(DetectionError::unavailable(
                "translate",
                format!("no capacity for {}", target_language),
            ));
        }
        Ok(format!("[{}] {}", target_language, text))
    }
}

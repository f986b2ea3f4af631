//! Stage handler behavior over in-memory collaborators.

use async_trait::async_trait;
use psry_core::{
    AttributeValue, Detection, EmotionScore, FilterConfig, PipelineConfig, PipelineError,
    ProcessStage, ProcessingRecord, RawFaceDetail, RecordId, StageUpdate, TextDetection,
};
use psry_db::{InMemoryRecordStore, RecordStore, RecordStoreResult, RecordStream};
use psry_detection::test_helpers::{
    FixedLanguageIdentifier, ScriptedFaceDetector, ScriptedTextDetector, TaggingTranslator,
};
use psry_detection::DetectionError;
use psry_pipeline::{
    Delivery, FaceDetectionStage, HandOffPublisher, RetrievalHandler, StageHandler, StageKind,
    TextExtractionStage, TranslationStage, UploadRequest, UploadStage,
};
use psry_storage::{MemoryStorage, Storage};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BUCKET: &str = "psr-bucket";
const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<(StageKind, String)>>,
}

impl RecordingPublisher {
    fn sent_to(&self, stage: StageKind) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| *target == stage)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl HandOffPublisher for RecordingPublisher {
    async fn publish(&self, target: StageKind, body: String) -> Result<(), PipelineError> {
        self.sent.lock().unwrap().push((target, body));
        Ok(())
    }
}

fn happy_face() -> RawFaceDetail {
    RawFaceDetail {
        smile: Some(Detection::new(true, 95.0)),
        gender: Some(Detection::new("Male".to_string(), 99.0)),
        eyes_open: Some(Detection::new(true, 60.0)),
        beard: Some(Detection::new(true, 76.0)),
        emotions: vec![
            EmotionScore::new("HAPPY", 97.0),
            EmotionScore::new("CALM", 12.0),
        ],
    }
}

async fn seeded_store(ids: &[&str]) -> Arc<InMemoryRecordStore> {
    let store = Arc::new(InMemoryRecordStore::new());
    for id in ids {
        let record = ProcessingRecord::uploaded(
            RecordId::new(*id),
            "a.png",
            format!("https://s3.us-east-1.amazonaws.com/{}/{}", BUCKET, id),
        );
        store.put(&record).await.unwrap();
    }
    store
}

fn location_body(key: &str) -> String {
    format!(r#"{{"bucket":"{}","key":"{}"}}"#, BUCKET, key)
}

fn s3_event_body(keys: &[&str]) -> String {
    let records: Vec<serde_json::Value> = keys
        .iter()
        .map(|key| {
            serde_json::json!({
                "eventName": "ObjectCreated:Put",
                "s3": {"bucket": {"name": BUCKET}, "object": {"key": key}}
            })
        })
        .collect();
    serde_json::json!({ "Records": records }).to_string()
}

fn pipeline_config(targets: &[&str]) -> PipelineConfig {
    PipelineConfig {
        target_languages: targets.iter().map(|t| t.to_string()).collect(),
        service_timeout: TIMEOUT,
        stage_concurrency: 4,
    }
}

#[tokio::test]
async fn upload_creates_record_and_returns_url() {
    let storage = Arc::new(MemoryStorage::new(BUCKET, "https://s3.us-east-1.amazonaws.com"));
    let store = Arc::new(InMemoryRecordStore::new());
    let stage = UploadStage::new(storage.clone(), store.clone(), 1024, TIMEOUT);

    let response = stage
        .upload(UploadRequest {
            file: "aGVsbG8=".to_string(),
            name: "a.png".to_string(),
        })
        .await
        .unwrap();

    let records = RetrievalHandler::new(store.clone(), TIMEOUT)
        .get_all()
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.process_stage, ProcessStage::Uploaded);
    assert_eq!(record.file_name, "a.png");
    assert_eq!(record.url, response.url);
    assert!(response.url.ends_with(record.id.as_str()));
    assert!(response
        .url
        .starts_with("https://s3.us-east-1.amazonaws.com/psr-bucket/"));
    assert!(record.face_detection.is_none());

    let object = storage.object(record.id.as_str()).await.unwrap();
    assert_eq!(object.data.as_ref(), b"hello");
    assert_eq!(object.visibility, psry_core::Visibility::PublicRead);
}

#[tokio::test]
async fn upload_with_invalid_base64_creates_nothing() {
    let storage = Arc::new(MemoryStorage::new(BUCKET, "http://localhost"));
    let store = Arc::new(InMemoryRecordStore::new());
    let stage = UploadStage::new(storage.clone(), store.clone(), 1024, TIMEOUT);

    let err = stage
        .upload(UploadRequest {
            file: "%%% not base64 %%%".to_string(),
            name: "a.png".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "ValidationError");
    assert!(store.is_empty().await);
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn upload_storage_failure_creates_no_record() {
    let storage = Arc::new(MemoryStorage::new(BUCKET, "http://localhost"));
    storage.fail_puts(true);
    let store = Arc::new(InMemoryRecordStore::new());
    let stage = UploadStage::new(storage.clone(), store.clone(), 1024, TIMEOUT);

    let err = stage
        .upload(UploadRequest {
            file: "aGVsbG8=".to_string(),
            name: "a.png".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "StorageError");
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn face_batch_isolates_missing_object() {
    let store = seeded_store(&["good.png", "gone.png"]).await;
    let detector = Arc::new(ScriptedFaceDetector::new().with_faces("good.png", vec![happy_face()]));
    let publisher = Arc::new(RecordingPublisher::default());
    let stage = FaceDetectionStage::new(
        detector,
        store.clone(),
        publisher.clone(),
        FilterConfig::default(),
        TIMEOUT,
        4,
    );

    let report = stage
        .handle_batch(vec![
            Delivery::new("m-good", s3_event_body(&["good.png"])),
            Delivery::new("m-gone", s3_event_body(&["gone.png"])),
        ])
        .await;

    assert_eq!(report.succeeded, vec!["m-good"]);
    assert_eq!(report.dropped, vec!["m-gone"]);
    assert!(report.retry.is_empty());

    let good = store.get(&RecordId::new("good.png")).await.unwrap();
    assert_eq!(good.process_stage, ProcessStage::FaceDetected);
    let faces = good.face_detection.unwrap();
    assert_eq!(faces.len(), 1);
    assert_eq!(faces[0].smile, AttributeValue::Bool(true));
    assert_eq!(faces[0].eyes_open, AttributeValue::Unknown);
    assert_eq!(faces[0].beard, AttributeValue::Bool(true));
    assert_eq!(faces[0].emotions, vec!["HAPPY"]);

    let gone = store.get(&RecordId::new("gone.png")).await.unwrap();
    assert_eq!(gone.process_stage, ProcessStage::Uploaded);

    assert_eq!(
        publisher.sent_to(StageKind::TextExtraction),
        vec![location_body("good.png")]
    );
}

#[tokio::test]
async fn detection_timeout_leaves_message_for_redelivery() {
    let store = seeded_store(&["slow.png"]).await;
    let detector = Arc::new(
        ScriptedFaceDetector::new()
            .with_faces("slow.png", vec![happy_face()])
            .with_delay(Duration::from_millis(200)),
    );
    let publisher = Arc::new(RecordingPublisher::default());
    let stage = FaceDetectionStage::new(
        detector,
        store.clone(),
        publisher.clone(),
        FilterConfig::default(),
        Duration::from_millis(20),
        4,
    );

    let report = stage
        .handle_batch(vec![Delivery::new("m1", location_body("slow.png"))])
        .await;

    assert_eq!(report.retry, vec!["m1"]);
    assert_eq!(report.acknowledged().count(), 0);
    let record = store.get(&RecordId::new("slow.png")).await.unwrap();
    assert_eq!(record.process_stage, ProcessStage::Uploaded);
    assert!(publisher.sent_to(StageKind::TextExtraction).is_empty());
}

#[tokio::test]
async fn throttled_detection_is_retried() {
    let store = seeded_store(&["a.png"]).await;
    let detector = Arc::new(ScriptedFaceDetector::new().with_error(
        "a.png",
        DetectionError::Throttled {
            service: "rekognition",
            message: "slow down".into(),
        },
    ));
    let stage = FaceDetectionStage::new(
        detector,
        store,
        Arc::new(RecordingPublisher::default()),
        FilterConfig::default(),
        TIMEOUT,
        4,
    );

    let report = stage
        .handle_batch(vec![Delivery::new("m1", location_body("a.png"))])
        .await;
    assert_eq!(report.retry, vec!["m1"]);
}

#[tokio::test]
async fn malformed_handoff_is_acknowledged() {
    let store = seeded_store(&[]).await;
    let detector = Arc::new(ScriptedFaceDetector::new());
    let stage = FaceDetectionStage::new(
        detector.clone(),
        store,
        Arc::new(RecordingPublisher::default()),
        FilterConfig::default(),
        TIMEOUT,
        4,
    );

    let report = stage
        .handle_batch(vec![
            Delivery::new("m1", r#"{"bucket":"psr-bucket"}"#),
            Delivery::new("m2", "not json"),
        ])
        .await;

    assert_eq!(report.dropped, vec!["m1", "m2"]);
    assert_eq!(detector.calls(), 0);
}

#[tokio::test]
async fn text_extraction_before_face_detection_is_retried() {
    let store = seeded_store(&["a.png"]).await;
    let detector =
        Arc::new(ScriptedTextDetector::new().with_text("a.png", vec![TextDetection::line("Hi", 99.0)]));
    let stage = TextExtractionStage::new(
        detector,
        store.clone(),
        Arc::new(RecordingPublisher::default()),
        FilterConfig::default(),
        TIMEOUT,
        4,
    );

    let report = stage
        .handle_batch(vec![Delivery::new("m1", location_body("a.png"))])
        .await;

    assert_eq!(report.retry, vec!["m1"]);
    let record = store.get(&RecordId::new("a.png")).await.unwrap();
    assert_eq!(record.process_stage, ProcessStage::Uploaded);
    assert!(record.image_text.is_none());
}

#[tokio::test]
async fn translation_passes_through_source_language() {
    let store = seeded_store(&[]).await;
    let translator = Arc::new(TaggingTranslator::new());
    let stage = TranslationStage::new(
        Arc::new(FixedLanguageIdentifier::new("en")),
        translator.clone(),
        store,
        &pipeline_config(&["pl", "en", "ru"]),
    );

    let translations = stage.translate_all("Hello world").await.unwrap();

    assert_eq!(translations.len(), 3);
    assert_eq!(translations["en"], "Hello world");
    assert_eq!(translations["pl"], "[pl] Hello world");
    assert_eq!(translations["ru"], "[ru] Hello world");
    let mut requests = translator.requests();
    requests.sort();
    assert_eq!(
        requests,
        vec![
            ("en".to_string(), "pl".to_string()),
            ("en".to_string(), "ru".to_string())
        ]
    );
}

#[tokio::test]
async fn translation_isolates_failing_target() {
    let store = seeded_store(&[]).await;
    let stage = TranslationStage::new(
        Arc::new(FixedLanguageIdentifier::new("de")),
        Arc::new(TaggingTranslator::new().failing_for("ru")),
        store,
        &pipeline_config(&["pl", "en", "ru"]),
    );

    let translations = stage.translate_all("Hallo").await.unwrap();
    assert_eq!(translations.len(), 2);
    assert!(translations.contains_key("pl"));
    assert!(translations.contains_key("en"));
}

#[tokio::test]
async fn translation_fails_when_every_target_fails() {
    let store = seeded_store(&[]).await;
    let stage = TranslationStage::new(
        Arc::new(FixedLanguageIdentifier::new("de")),
        Arc::new(
            TaggingTranslator::new()
                .failing_for("pl")
                .failing_for("en"),
        ),
        store,
        &pipeline_config(&["pl", "en"]),
    );

    let err = stage.translate_all("Hallo").await.unwrap_err();
    assert_eq!(err.kind(), "DetectionServiceError");
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn empty_text_translates_to_empty_strings_without_calls() {
    let store = seeded_store(&[]).await;
    let identifier = Arc::new(FixedLanguageIdentifier::new("en"));
    let translator = Arc::new(TaggingTranslator::new());
    let stage = TranslationStage::new(
        identifier.clone(),
        translator.clone(),
        store,
        &pipeline_config(&["pl", "en", "ru"]),
    );

    let translations = stage.translate_all("").await.unwrap();
    assert_eq!(translations.len(), 3);
    assert!(translations.values().all(String::is_empty));
    assert_eq!(identifier.calls(), 0);
    assert!(translator.requests().is_empty());
}

#[tokio::test]
async fn full_pipeline_reaches_text_translated_and_is_idempotent() {
    let store = seeded_store(&["img.png"]).await;
    let publisher = Arc::new(RecordingPublisher::default());
    let config = pipeline_config(&["pl", "en", "ru"]);

    let faces = FaceDetectionStage::new(
        Arc::new(ScriptedFaceDetector::new().with_faces("img.png", vec![happy_face()])),
        store.clone(),
        publisher.clone(),
        FilterConfig::default(),
        TIMEOUT,
        4,
    );
    let text = TextExtractionStage::new(
        Arc::new(ScriptedTextDetector::new().with_text(
            "img.png",
            vec![
                TextDetection::line("Hello", 98.0),
                TextDetection::word("Hello", 98.0),
                TextDetection::line("world", 91.0),
            ],
        )),
        store.clone(),
        publisher.clone(),
        FilterConfig::default(),
        TIMEOUT,
        4,
    );
    let translation = TranslationStage::new(
        Arc::new(FixedLanguageIdentifier::new("en")),
        Arc::new(TaggingTranslator::new()),
        store.clone(),
        &config,
    );

    faces
        .handle_batch(vec![Delivery::new("f1", s3_event_body(&["img.png"]))])
        .await;
    let text_body = publisher.sent_to(StageKind::TextExtraction).remove(0);
    text.handle_batch(vec![Delivery::new("t1", text_body.clone())])
        .await;
    let translation_body = publisher.sent_to(StageKind::Translation).remove(0);
    assert_eq!(
        translation_body,
        r#"{"id":"img.png","text":"Hello\nworld"}"#
    );
    let report = translation
        .handle_batch(vec![Delivery::new("r1", translation_body.clone())])
        .await;
    assert_eq!(report.succeeded, vec!["r1"]);

    let first = store.get(&RecordId::new("img.png")).await.unwrap();
    assert_eq!(first.process_stage, ProcessStage::TextTranslated);
    assert_eq!(first.image_text.as_deref(), Some("Hello\nworld"));
    assert_eq!(
        first.translations.as_ref().unwrap()["en"],
        "Hello\nworld"
    );

    // Redelivering every hand-off leaves the same field values and the final stage.
    faces
        .handle_batch(vec![Delivery::new("f1", s3_event_body(&["img.png"]))])
        .await;
    text.handle_batch(vec![Delivery::new("t1", text_body)]).await;
    translation
        .handle_batch(vec![Delivery::new("r1", translation_body)])
        .await;

    let second = store.get(&RecordId::new("img.png")).await.unwrap();
    assert_eq!(second.process_stage, ProcessStage::TextTranslated);
    assert_eq!(second.face_detection, first.face_detection);
    assert_eq!(second.image_text, first.image_text);
    assert_eq!(second.translations, first.translations);
}

#[tokio::test]
async fn get_one_of_missing_record_is_not_found() {
    let store = seeded_store(&[]).await;
    let err = RetrievalHandler::new(store, TIMEOUT)
        .get_one(&RecordId::new("missing.png"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NotFoundError");
}

#[tokio::test]
async fn storage_url_matches_public_url() {
    let storage = MemoryStorage::new(BUCKET, "https://s3.us-east-1.amazonaws.com");
    assert_eq!(
        storage.public_url("x.png"),
        "https://s3.us-east-1.amazonaws.com/psr-bucket/x.png"
    );
}

/// Record store whose calls never complete.
struct StalledStore;

#[async_trait]
impl RecordStore for StalledStore {
    async fn get(&self, _id: &RecordId) -> RecordStoreResult<ProcessingRecord> {
        futures::future::pending().await
    }

    async fn put(&self, _record: &ProcessingRecord) -> RecordStoreResult<()> {
        futures::future::pending().await
    }

    async fn update(
        &self,
        _id: &RecordId,
        _update: StageUpdate,
    ) -> RecordStoreResult<ProcessingRecord> {
        futures::future::pending().await
    }

    fn scan_all(&self) -> RecordStream {
        Box::pin(futures::stream::pending())
    }
}

#[tokio::test]
async fn stalled_record_store_times_out_retrieval() {
    let retrieval = RetrievalHandler::new(Arc::new(StalledStore), Duration::from_millis(50));

    let err = retrieval
        .get_one(&RecordId::new("img.png"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "TimeoutError");
    assert!(err.to_string().contains("get_record"));

    let err = retrieval.get_all().await.unwrap_err();
    assert_eq!(err.kind(), "TimeoutError");
    assert!(err.to_string().contains("scan_records"));
}

#[tokio::test]
async fn stalled_record_write_times_out_and_removes_object() {
    let storage = Arc::new(MemoryStorage::new(BUCKET, "https://s3.us-east-1.amazonaws.com"));
    let stage = UploadStage::new(
        storage.clone(),
        Arc::new(StalledStore),
        1024,
        Duration::from_millis(50),
    );

    let err = stage
        .upload(UploadRequest {
            file: "aGVsbG8=".to_string(),
            name: "a.png".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "TimeoutError");
    assert!(storage.is_empty().await);
}

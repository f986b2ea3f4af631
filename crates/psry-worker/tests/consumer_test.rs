//! Stage consumers over the in-memory transport.

use psry_core::{
    Detection, FilterConfig, PipelineConfig, ProcessStage, ProcessingRecord, RawFaceDetail,
    RecordId, TextDetection,
};
use psry_db::{InMemoryRecordStore, RecordStore};
use psry_detection::test_helpers::{
    FixedLanguageIdentifier, ScriptedFaceDetector, ScriptedTextDetector, TaggingTranslator,
};
use psry_detection::DetectionError;
use psry_pipeline::{
    FaceDetectionStage, HandOffPublisher, StageKind, TextExtractionStage, TranslationStage,
};
use psry_worker::{ConsumerConfig, HandOffTransport, InMemoryTransport, StageConsumer};
use std::sync::Arc;
use std::time::Duration;

const BUCKET: &str = "psr-bucket";
const TIMEOUT: Duration = Duration::from_secs(5);

fn consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        max_messages: 10,
        wait_time: Duration::from_millis(50),
        error_backoff: Duration::from_millis(10),
    }
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        target_languages: vec!["pl".into(), "en".into(), "ru".into()],
        service_timeout: TIMEOUT,
        stage_concurrency: 4,
    }
}

fn location_body(key: &str) -> String {
    serde_json::json!({ "bucket": BUCKET, "key": key }).to_string()
}

fn smiling_face() -> RawFaceDetail {
    RawFaceDetail {
        smile: Some(Detection::new(true, 99.0)),
        gender: Some(Detection::new("Female".to_string(), 99.0)),
        eyes_open: Some(Detection::new(true, 99.0)),
        beard: Some(Detection::new(false, 99.0)),
        emotions: vec![],
    }
}

async fn store_with(ids: &[&str]) -> Arc<InMemoryRecordStore> {
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

#[tokio::test]
async fn poll_once_acknowledges_succeeded_and_dropped_messages() {
    let transport = Arc::new(InMemoryTransport::with_visibility_timeout(Duration::ZERO));
    let store = store_with(&["ok.png"]).await;
    let detector = ScriptedFaceDetector::new()
        .with_faces("ok.png", vec![smiling_face()])
        .with_error(
            "gone.png",
            DetectionError::rejected("rekognition", "InvalidS3ObjectException"),
        );

    let stage = FaceDetectionStage::new(
        Arc::new(detector),
        store.clone(),
        transport.clone(),
        FilterConfig::default(),
        TIMEOUT,
        4,
    );
    let consumer = StageConsumer::new(Arc::new(stage), transport.clone(), consumer_config());

    transport
        .publish(StageKind::FaceDetection, location_body("ok.png"))
        .await
        .unwrap();
    transport
        .publish(StageKind::FaceDetection, location_body("gone.png"))
        .await
        .unwrap();
    transport
        .publish(StageKind::FaceDetection, "{not json".to_string())
        .await
        .unwrap();

    let report = consumer.poll_once().await.unwrap();
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.dropped.len(), 2);
    assert!(report.retry.is_empty());

    assert_eq!(transport.in_flight(StageKind::FaceDetection).await, 0);
    assert_eq!(transport.pending(StageKind::FaceDetection).await, 0);
    assert_eq!(transport.pending(StageKind::TextExtraction).await, 1);

    let record = store.get(&RecordId::new("ok.png")).await.unwrap();
    assert_eq!(record.process_stage, ProcessStage::FaceDetected);
}

#[tokio::test]
async fn recoverable_failures_are_redelivered() {
    let transport = Arc::new(InMemoryTransport::with_visibility_timeout(Duration::ZERO));
    let store = store_with(&["busy.png"]).await;
    let detector = ScriptedFaceDetector::new().with_error(
        "busy.png",
        DetectionError::Throttled {
            service: "rekognition",
            message: "slow down".into(),
        },
    );

    let stage = FaceDetectionStage::new(
        Arc::new(detector),
        store.clone(),
        transport.clone(),
        FilterConfig::default(),
        TIMEOUT,
        4,
    );
    let consumer = StageConsumer::new(Arc::new(stage), transport.clone(), consumer_config());

    transport
        .publish(StageKind::FaceDetection, location_body("busy.png"))
        .await
        .unwrap();

    let first = consumer.poll_once().await.unwrap();
    assert_eq!(first.retry.len(), 1);
    assert_eq!(transport.in_flight(StageKind::FaceDetection).await, 1);

    let second = consumer.poll_once().await.unwrap();
    assert_eq!(second.retry, first.retry);

    let record = store.get(&RecordId::new("busy.png")).await.unwrap();
    assert_eq!(record.process_stage, ProcessStage::Uploaded);
}

#[tokio::test]
async fn empty_queue_yields_empty_report() {
    let transport = Arc::new(InMemoryTransport::new());
    let store = store_with(&[]).await;
    let stage = TranslationStage::new(
        Arc::new(FixedLanguageIdentifier::new("en")),
        Arc::new(TaggingTranslator::new()),
        store,
        &pipeline_config(),
    );
    let consumer = StageConsumer::new(Arc::new(stage), transport, consumer_config());

    let report = consumer.poll_once().await.unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn spawned_consumers_carry_an_image_through_every_stage() {
    let transport = Arc::new(InMemoryTransport::new());
    let store = store_with(&["sign.png"]).await;

    let faces = Arc::new(ScriptedFaceDetector::new().with_faces("sign.png", vec![smiling_face()]));
    let text = Arc::new(ScriptedTextDetector::new().with_text(
        "sign.png",
        vec![
            TextDetection::line("HELLO", 99.0),
            TextDetection::word("HELLO", 99.0),
            TextDetection::line("WORLD", 95.0),
        ],
    ));

    let face_stage = FaceDetectionStage::new(
        faces,
        store.clone(),
        transport.clone(),
        FilterConfig::default(),
        TIMEOUT,
        4,
    );
    let text_stage = TextExtractionStage::new(
        text,
        store.clone(),
        transport.clone(),
        FilterConfig::default(),
        TIMEOUT,
        4,
    );
    let translation_stage = TranslationStage::new(
        Arc::new(FixedLanguageIdentifier::new("en")),
        Arc::new(TaggingTranslator::new()),
        store.clone(),
        &pipeline_config(),
    );

    let consumer_transport: Arc<dyn HandOffTransport> = transport.clone();
    let handles = vec![
        StageConsumer::new(
            Arc::new(face_stage),
            consumer_transport.clone(),
            consumer_config(),
        )
        .spawn(),
        StageConsumer::new(
            Arc::new(text_stage),
            consumer_transport.clone(),
            consumer_config(),
        )
        .spawn(),
        StageConsumer::new(
            Arc::new(translation_stage),
            consumer_transport,
            consumer_config(),
        )
        .spawn(),
    ];

    transport
        .publish(StageKind::FaceDetection, location_body("sign.png"))
        .await
        .unwrap();

    let id = RecordId::new("sign.png");
    let record = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = store.get(&id).await.unwrap();
            if record.process_stage == ProcessStage::TextTranslated {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("record never reached text_translated");

    for handle in handles {
        handle.shutdown().await;
    }

    assert_eq!(record.image_text.as_deref(), Some("HELLO\nWORLD"));
    let translations = record.translations.unwrap();
    assert_eq!(translations["en"], "HELLO\nWORLD");
    assert_eq!(translations["pl"], "[pl] HELLO\nWORLD");
    assert_eq!(translations["ru"], "[ru] HELLO\nWORLD");
    assert_eq!(record.face_detection.map(|faces| faces.len()), Some(1));

    for stage in StageKind::ALL {
        assert_eq!(transport.pending(stage).await, 0);
        assert_eq!(transport.in_flight(stage).await, 0);
    }
}

#[tokio::test]
async fn shutdown_stops_an_idle_consumer() {
    let transport = Arc::new(InMemoryTransport::new());
    let stage = TranslationStage::new(
        Arc::new(FixedLanguageIdentifier::new("en")),
        Arc::new(TaggingTranslator::new()),
        store_with(&[]).await,
        &pipeline_config(),
    );
    let config = ConsumerConfig {
        wait_time: Duration::from_secs(30),
        ..consumer_config()
    };

    let handle = StageConsumer::new(Arc::new(stage), transport, config).spawn();
    assert_eq!(handle.stage(), StageKind::Translation);

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("consumer did not stop");
}

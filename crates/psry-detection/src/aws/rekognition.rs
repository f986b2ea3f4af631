use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rekognition::types::{Attribute, FaceDetail, Image, S3Object, TextTypes};
use aws_sdk_rekognition::Client as RekognitionClient;
use psry_core::{Detection, EmotionScore, ObjectLocation, RawFaceDetail, TextDetection};

use super::classify_sdk_error;
use crate::error::DetectionResult;
use crate::traits::{FaceDetector, TextDetector};

const SERVICE: &str = "rekognition";

/// Face and text detection over images already stored in S3.
#[derive(Clone)]
pub struct RekognitionDetector {
    client: RekognitionClient,
}

impl RekognitionDetector {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: RekognitionClient::new(config),
        }
    }

    fn image(location: &ObjectLocation) -> Image {
        Image::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&location.bucket)
                    .name(&location.key)
                    .build(),
            )
            .build()
    }
}

/// Missing confidences leave the attribute absent, which the filter reports as malformed.
fn raw_face(detail: &FaceDetail) -> RawFaceDetail {
    RawFaceDetail {
        smile: detail
            .smile()
            .and_then(|s| s.confidence().map(|c| Detection::new(s.value(), c))),
        gender: detail.gender().and_then(|g| {
            let value = g.value()?.as_str().to_string();
            g.confidence().map(|c| Detection::new(value, c))
        }),
        eyes_open: detail
            .eyes_open()
            .and_then(|e| e.confidence().map(|c| Detection::new(e.value(), c))),
        beard: detail
            .beard()
            .and_then(|b| b.confidence().map(|c| Detection::new(b.value(), c))),
        emotions: detail
            .emotions()
            .iter()
            .filter_map(|emotion| {
                let name = emotion.r#type()?.as_str();
                emotion
                    .confidence()
                    .map(|confidence| EmotionScore::new(name, confidence))
            })
            .collect(),
    }
}

#[async_trait]
impl FaceDetector for RekognitionDetector {
    async fn detect_faces(&self, location: &ObjectLocation) -> DetectionResult<Vec<RawFaceDetail>> {
        let response = self
            .client
            .detect_faces()
            .image(Self::image(location))
            .attributes(Attribute::All)
            .send()
            .await
            .map_err(|e| classify_sdk_error(SERVICE, e))?;

        let faces: Vec<RawFaceDetail> = response.face_details().iter().map(raw_face).collect();

        tracing::debug!(
            location = %location,
            face_count = faces.len(),
            "Rekognition face detection completed"
        );

        Ok(faces)
    }
}

#[async_trait]
impl TextDetector for RekognitionDetector {
    async fn detect_text(&self, location: &ObjectLocation) -> DetectionResult<Vec<TextDetection>> {
        let response = self
            .client
            .detect_text()
            .image(Self::image(location))
            .send()
            .await
            .map_err(|e| classify_sdk_error(SERVICE, e))?;

        let detections: Vec<TextDetection> = response
            .text_detections()
            .iter()
            .filter_map(|detection| {
                let text = detection.detected_text()?.to_string();
                let confidence = detection.confidence()?;
                match detection.r#type()? {
                    TextTypes::Line => Some(TextDetection::line(text, confidence)),
                    TextTypes::Word => Some(TextDetection::word(text, confidence)),
                    _ => None,
                }
            })
            .collect();

        tracing::debug!(
            location = %location,
            detection_count = detections.len(),
            "Rekognition text detection completed"
        );

        Ok(detections)
    }
}

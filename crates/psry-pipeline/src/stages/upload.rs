use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use psry_core::{PipelineError, ProcessingRecord, RecordId, Visibility};
use psry_db::RecordStore;
use psry_storage::Storage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::with_timeout;

const MAX_NAME_LENGTH: usize = 255;

/// Upload request body: base64 image bytes and the display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub file: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Stores an uploaded image and creates its record at `uploaded`.
///
/// No hand-off is published: the object store's change notification starts face detection.
pub struct UploadStage {
    storage: Arc<dyn Storage>,
    store: Arc<dyn RecordStore>,
    max_bytes: usize,
    timeout: Duration,
}

impl UploadStage {
    pub fn new(
        storage: Arc<dyn Storage>,
        store: Arc<dyn RecordStore>,
        max_bytes: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            storage,
            store,
            max_bytes,
            timeout,
        }
    }

    #[tracing::instrument(skip(self, request), fields(stage = "upload", file_name = %request.name))]
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadResponse, PipelineError> {
        let name = validate_name(&request.name)?;
        let data = decode_file(&request.file, self.max_bytes)?;
        let size_bytes = data.len();

        let id = RecordId::generate(name);
        let url = with_timeout(
            "put_object",
            self.timeout,
            self.storage.put(
                id.as_str(),
                data,
                content_type(id.as_str()),
                Visibility::PublicRead,
            ),
        )
        .await?;

        let record = ProcessingRecord::uploaded(id.clone(), name, url.clone());
        if let Err(err) = with_timeout("put_record", self.timeout, self.store.put(&record)).await {
            // The object must not outlive a failed record write.
            let cleanup = self.storage.delete(id.as_str());
            if let Err(cleanup) = with_timeout("delete_object", self.timeout, cleanup).await {
                tracing::warn!(record_id = %id, error = %cleanup, "Failed to remove orphaned object");
            }
            return Err(err);
        }

        tracing::info!(record_id = %id, size_bytes, url = %url, "Image uploaded");
        Ok(UploadResponse { url })
    }
}

fn validate_name(name: &str) -> Result<&str, PipelineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PipelineError::Validation("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(PipelineError::Validation(format!(
            "name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(PipelineError::Validation(
            "name must not contain control characters".to_string(),
        ));
    }
    Ok(name)
}

/// Decode the base64 payload, accepting an optional `data:<mime>;base64,` prefix.
fn decode_file(file: &str, max_bytes: usize) -> Result<Bytes, PipelineError> {
    let encoded = match file.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => file,
    };
    let encoded: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if encoded.is_empty() {
        return Err(PipelineError::Validation("file must not be empty".to_string()));
    }

    let data = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| PipelineError::Validation(format!("file is not valid base64: {}", e)))?;

    if data.is_empty() {
        return Err(PipelineError::Validation("file must not be empty".to_string()));
    }
    if data.len() > max_bytes {
        return Err(PipelineError::Validation(format!(
            "file is {} bytes; the limit is {} bytes",
            data.len(),
            max_bytes
        )));
    }

    Ok(Bytes::from(data))
}

fn content_type(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_and_data_url_payloads() {
        assert_eq!(decode_file("aGVsbG8=", 100).unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(
            decode_file("data:image/png;base64,aGVs\nbG8=", 100).unwrap(),
            Bytes::from_static(b"hello")
        );
    }

    #[test]
    fn rejects_invalid_payloads() {
        assert!(matches!(
            decode_file("not base64!", 100),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(decode_file("", 100), Err(PipelineError::Validation(_))));
        assert!(matches!(
            decode_file("aGVsbG8=", 3),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn validates_display_name() {
        assert_eq!(validate_name("  a.png ").unwrap(), "a.png");
        assert!(validate_name("   ").is_err());
        assert!(validate_name("a\u{0}.png").is_err());
        assert!(validate_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type("abc.jpg"), "image/jpeg");
        assert_eq!(content_type("abc.png"), "image/png");
    }
}

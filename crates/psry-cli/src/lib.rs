//! HTTP client and output formatting for the psry command-line tool.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use psry_core::ProcessingRecord;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:4000";

#[derive(Debug, Serialize)]
struct UploadBody<'a> {
    file: String,
    name: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

/// HTTP client for the psry API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client for `PSRY_API_URL` (or `API_URL`), defaulting to a local server.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("PSRY_API_URL")
            .or_else(|_| std::env::var("API_URL"))
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(&base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Upload the file at `path` under its file name.
    pub async fn upload(&self, path: &Path) -> Result<UploadResponse> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Upload path has no usable file name")?;
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        tracing::debug!(name, size_bytes = data.len(), "Uploading file");
        let body = UploadBody {
            file: STANDARD.encode(&data),
            name,
        };

        let response = self
            .client
            .post(self.build_url("/upload"))
            .json(&body)
            .send()
            .await
            .context("Failed to send request")?;
        decode(response).await
    }

    pub async fn list_records(&self) -> Result<Vec<ProcessingRecord>> {
        self.get("/records").await
    }

    pub async fn get_record(&self, id: &str) -> Result<ProcessingRecord> {
        self.get(&format!("/records/{}", urlencoding::encode(id)))
            .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.build_url(path))
            .send()
            .await
            .context("Failed to send request")?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(anyhow::anyhow!(
            "API request failed with status {}: {}",
            status,
            error_text
        ));
    }

    response
        .json::<T>()
        .await
        .context("Failed to parse response")
}

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// One line per record: ID, file name, stage and the start of the extracted text.
pub fn format_table(records: &[ProcessingRecord]) -> String {
    let mut out = format!("{:<42} {:<24} {:<16} {}\n", "ID", "FILE", "STAGE", "TEXT");
    for record in records {
        let text = record
            .image_text
            .as_deref()
            .map(|t| t.replace('\n', " "))
            .unwrap_or_default();
        out.push_str(&format!(
            "{:<42} {:<24} {:<16} {}\n",
            record.id.as_str(),
            truncate_string(&record.file_name, 24),
            record.process_stage.to_string(),
            truncate_string(&text, 40)
        ));
    }
    out
}

/// Field-by-field view of one record.
pub fn format_record(record: &ProcessingRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("ID:       {}\n", record.id));
    out.push_str(&format!("File:     {}\n", record.file_name));
    out.push_str(&format!("URL:      {}\n", record.url));
    out.push_str(&format!("Stage:    {}\n", record.process_stage));
    out.push_str(&format!("Created:  {}\n", record.created_at.to_rfc3339()));
    out.push_str(&format!("Updated:  {}\n", record.updated_at.to_rfc3339()));

    if let Some(faces) = &record.face_detection {
        out.push_str(&format!("Faces:    {}\n", faces.len()));
        for (i, face) in faces.iter().enumerate() {
            let summary = serde_json::to_string(face).unwrap_or_default();
            out.push_str(&format!("  [{}] {}\n", i, summary));
        }
    }
    if let Some(text) = &record.image_text {
        out.push_str("Text:\n");
        for line in text.lines() {
            out.push_str(&format!("  {}\n", line));
        }
    }
    if let Some(translations) = &record.translations {
        out.push_str("Translations:\n");
        for (language, text) in translations {
            out.push_str(&format!("  {}: {}\n", language, text.replace('\n', " / ")));
        }
    }
    out
}

/// Initialize tracing for the CLI. Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use psry_core::{RecordId, StageUpdate};
    use std::collections::BTreeMap;

    fn record() -> ProcessingRecord {
        ProcessingRecord::uploaded(
            RecordId::new("0b6c.png"),
            "holiday.png",
            "https://s3.us-east-1.amazonaws.com/bucket/0b6c.png",
        )
    }

    #[test]
    fn truncate_string_short() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello", 5), "hello");
    }

    #[test]
    fn truncate_string_long() {
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("hello", 0), "...");
    }

    #[test]
    fn truncate_string_counts_characters() {
        assert_eq!(truncate_string("zażółć gęślą", 7), "zażó...");
    }

    #[test]
    fn build_url_strips_trailing_slash() {
        let client = ApiClient::new("http://localhost:4000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:4000");
        assert_eq!(client.build_url("/records"), "http://localhost:4000/records");
    }

    #[test]
    fn table_has_header_and_one_row_per_record() {
        let mut translated = record();
        translated
            .apply(StageUpdate::FaceDetected(vec![]))
            .unwrap();
        translated
            .apply(StageUpdate::TextProcessed("STOP\nNO PARKING".into()))
            .unwrap();

        let table = format_table(&[record(), translated]);
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].contains("uploaded"));
        assert!(lines[2].contains("text_processed"));
        assert!(lines[2].contains("STOP NO PARKING"));
    }

    #[test]
    fn record_view_lists_translations() {
        let mut record = record();
        record.apply(StageUpdate::FaceDetected(vec![])).unwrap();
        record
            .apply(StageUpdate::TextProcessed("hello".into()))
            .unwrap();
        let translations: BTreeMap<String, String> = [
            ("en".to_string(), "hello".to_string()),
            ("pl".to_string(), "cześć".to_string()),
        ]
        .into();
        record
            .apply(StageUpdate::TextTranslated(translations))
            .unwrap();

        let view = format_record(&record);
        assert!(view.contains("Stage:    text_translated"));
        assert!(view.contains("Faces:    0"));
        assert!(view.contains("  pl: cześć"));
    }
}

//! Configuration module
//!
//! Configuration is read from the environment (after loading `.env` via `dotenvy`). Every
//! binary calls [`Config::from_env`] followed by [`Config::validate`].

use std::env;
use std::time::Duration;

use regex::Regex;

use crate::storage_types::{RecordStoreBackend, StorageBackend, TransportBackend};

// Common constants
const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_UPLOAD_SIZE_MB: usize = 10;
const RECORD_TABLE: &str = "processing_records";
const DEFAULT_REGION: &str = "us-east-1";
const SQS_MAX_MESSAGES: i32 = 10;
const SQS_WAIT_TIME_SECONDS: i32 = 20;
const SERVICE_TIMEOUT_SECS: u64 = 30;
const STAGE_CONCURRENCY: usize = 4;
const TARGET_LANGUAGES: &str = "pl,en,ru";

pub const SMILE_THRESHOLD: f32 = 80.0;
pub const GENDER_THRESHOLD: f32 = 80.0;
pub const EYES_OPEN_THRESHOLD: f32 = 70.0;
pub const BEARD_THRESHOLD: f32 = 75.0;
/// Emotion threshold on the same 0-100 scale as the attribute thresholds.
pub const EMOTION_THRESHOLD: f32 = 50.0;
pub const LINE_CONFIDENCE_THRESHOLD: f32 = 70.0;
pub const LINE_DELIMITER: &str = "\n";

/// Confidence thresholds for the face and text filters. All values are on the 0-100 scale.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterConfig {
    pub smile_threshold: f32,
    pub gender_threshold: f32,
    pub eyes_open_threshold: f32,
    pub beard_threshold: f32,
    pub emotion_threshold: f32,
    pub line_confidence_threshold: f32,
    pub line_delimiter: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            smile_threshold: SMILE_THRESHOLD,
            gender_threshold: GENDER_THRESHOLD,
            eyes_open_threshold: EYES_OPEN_THRESHOLD,
            beard_threshold: BEARD_THRESHOLD,
            emotion_threshold: EMOTION_THRESHOLD,
            line_confidence_threshold: LINE_CONFIDENCE_THRESHOLD,
            line_delimiter: LINE_DELIMITER.to_string(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let thresholds = [
            ("SMILE_CONFIDENCE_THRESHOLD", self.smile_threshold),
            ("GENDER_CONFIDENCE_THRESHOLD", self.gender_threshold),
            ("EYES_OPEN_CONFIDENCE_THRESHOLD", self.eyes_open_threshold),
            ("BEARD_CONFIDENCE_THRESHOLD", self.beard_threshold),
            ("EMOTION_CONFIDENCE_THRESHOLD", self.emotion_threshold),
            ("LINE_CONFIDENCE_THRESHOLD", self.line_confidence_threshold),
        ];

        for (name, value) in thresholds {
            if !(0.0..=100.0).contains(&value) {
                return Err(anyhow::anyhow!(
                    "{} must be between 0 and 100, got {}",
                    name,
                    value
                ));
            }
        }

        // The emotion threshold used to be expressed on a 0-1 scale. Refuse such values
        // instead of guessing which scale was meant.
        if self.emotion_threshold > 0.0 && self.emotion_threshold <= 1.0 {
            return Err(anyhow::anyhow!(
                "EMOTION_CONFIDENCE_THRESHOLD is on the 0-100 scale (got {}); use e.g. 50 instead of 0.5",
                self.emotion_threshold
            ));
        }

        Ok(())
    }
}

/// Stage execution settings.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Language codes every text is translated into.
    pub target_languages: Vec<String>,
    /// Deadline for each call to an external collaborator.
    pub service_timeout: Duration,
    /// Maximum number of hand-offs of one batch processed at the same time.
    pub stage_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_languages: split_list(TARGET_LANGUAGES),
            service_timeout: Duration::from_secs(SERVICE_TIMEOUT_SECS),
            stage_concurrency: STAGE_CONCURRENCY,
        }
    }
}

/// Application configuration shared by the API, the worker and the CLI.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub server_port: u16,
    pub max_upload_size_bytes: usize,
    pub log_format: String,
    // Record store
    pub record_store_backend: RecordStoreBackend,
    pub database_url: Option<String>,
    pub record_table: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Object store
    pub storage_backend: StorageBackend,
    pub bucket: Option<String>,
    pub aws_region: String,
    pub s3_endpoint: Option<String>,
    pub public_url_host: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Hand-off transport
    pub transport_backend: TransportBackend,
    pub face_detection_queue_url: Option<String>,
    pub text_extraction_queue_url: Option<String>,
    pub translation_queue_url: Option<String>,
    pub sqs_max_messages: i32,
    pub sqs_wait_time_seconds: i32,
    // Stage behavior
    pub filter: FilterConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|key| var(key));

        let environment = first(&["ENVIRONMENT", "APP_ENV"]).unwrap_or_else(|| "development".into());

        let server_port = parse_var(&var, "PORT", SERVER_PORT)?;

        let max_upload_size_mb = parse_var(&var, "MAX_UPLOAD_SIZE_MB", MAX_UPLOAD_SIZE_MB)?;

        let record_store_backend = var("STORE_BACKEND")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(RecordStoreBackend::Postgres);

        let storage_backend = var("STORAGE_BACKEND")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(StorageBackend::S3);

        let transport_backend = var("TRANSPORT_BACKEND")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(TransportBackend::Sqs);

        let defaults = FilterConfig::default();
        let filter = FilterConfig {
            smile_threshold: parse_var(
                &var,
                "SMILE_CONFIDENCE_THRESHOLD",
                defaults.smile_threshold,
            )?,
            gender_threshold: parse_var(
                &var,
                "GENDER_CONFIDENCE_THRESHOLD",
                defaults.gender_threshold,
            )?,
            eyes_open_threshold: parse_var(
                &var,
                "EYES_OPEN_CONFIDENCE_THRESHOLD",
                defaults.eyes_open_threshold,
            )?,
            beard_threshold: parse_var(
                &var,
                "BEARD_CONFIDENCE_THRESHOLD",
                defaults.beard_threshold,
            )?,
            emotion_threshold: parse_var(
                &var,
                "EMOTION_CONFIDENCE_THRESHOLD",
                defaults.emotion_threshold,
            )?,
            line_confidence_threshold: parse_var(
                &var,
                "LINE_CONFIDENCE_THRESHOLD",
                defaults.line_confidence_threshold,
            )?,
            // Delimiter may legitimately be whitespace, so read it without the emptiness filter.
            line_delimiter: lookup("TEXT_LINE_DELIMITER")
                .filter(|v| !v.is_empty())
                .map(|v| v.replace("\\n", "\n").replace("\\t", "\t"))
                .unwrap_or(defaults.line_delimiter),
        };

        let pipeline = PipelineConfig {
            target_languages: split_list(
                &var("TARGET_LANGUAGES").unwrap_or_else(|| TARGET_LANGUAGES.to_string()),
            ),
            service_timeout: Duration::from_secs(parse_var(
                &var,
                "SERVICE_TIMEOUT_SECS",
                SERVICE_TIMEOUT_SECS,
            )?),
            stage_concurrency: parse_var(&var, "STAGE_CONCURRENCY", STAGE_CONCURRENCY)?,
        };

        Ok(Config {
            environment,
            server_port,
            max_upload_size_bytes: max_upload_size_mb * 1024 * 1024,
            log_format: var("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            record_store_backend,
            database_url: var("DATABASE_URL"),
            record_table: var("RECORD_TABLE").unwrap_or_else(|| RECORD_TABLE.to_string()),
            db_max_connections: parse_var(&var, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS)?,
            db_timeout_seconds: parse_var(&var, "DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS)?,
            storage_backend,
            bucket: first(&["BUCKET", "S3_BUCKET"]),
            aws_region: first(&["S3_REGION", "AWS_REGION"])
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            s3_endpoint: var("S3_ENDPOINT"),
            public_url_host: var("PUBLIC_URL_HOST"),
            local_storage_path: var("LOCAL_STORAGE_PATH"),
            local_storage_base_url: var("LOCAL_STORAGE_BASE_URL"),
            transport_backend,
            face_detection_queue_url: var("FACE_DETECTION_QUEUE_URL"),
            text_extraction_queue_url: var("TEXT_EXTRACTION_QUEUE_URL"),
            translation_queue_url: var("TRANSLATION_QUEUE_URL"),
            sqs_max_messages: parse_var(&var, "SQS_MAX_MESSAGES", SQS_MAX_MESSAGES)?,
            sqs_wait_time_seconds: parse_var(
                &var,
                "SQS_WAIT_TIME_SECONDS",
                SQS_WAIT_TIME_SECONDS,
            )?,
            filter,
            pipeline,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.filter.validate()?;

        if self.record_store_backend == RecordStoreBackend::Postgres {
            if self.database_url.is_none() {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL is required when STORE_BACKEND=postgres"
                ));
            }
            validate_table_name(&self.record_table)?;
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.bucket.is_none() {
                    return Err(anyhow::anyhow!("BUCKET (or S3_BUCKET) is required for S3"));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() || self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH and LOCAL_STORAGE_BASE_URL are required for local storage"
                    ));
                }
            }
            StorageBackend::Memory => {}
        }

        if !(1..=10).contains(&self.sqs_max_messages) {
            return Err(anyhow::anyhow!("SQS_MAX_MESSAGES must be between 1 and 10"));
        }

        if !(0..=20).contains(&self.sqs_wait_time_seconds) {
            return Err(anyhow::anyhow!("SQS_WAIT_TIME_SECONDS must be between 0 and 20"));
        }

        if self.pipeline.target_languages.is_empty() {
            return Err(anyhow::anyhow!("TARGET_LANGUAGES must name at least one language"));
        }

        if self.pipeline.service_timeout.is_zero() {
            return Err(anyhow::anyhow!("SERVICE_TIMEOUT_SECS must be at least 1"));
        }

        if self.pipeline.stage_concurrency == 0 {
            return Err(anyhow::anyhow!("STAGE_CONCURRENCY must be at least 1"));
        }

        Ok(())
    }

    /// Bucket name used in object locations; local storage uses a fixed logical bucket.
    pub fn bucket_name(&self) -> &str {
        self.bucket.as_deref().unwrap_or("local")
    }
}

/// Record table names are interpolated into SQL, so only plain identifiers are accepted.
pub fn validate_table_name(name: &str) -> Result<(), anyhow::Error> {
    let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")?;
    if identifier.is_match(name) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Invalid RECORD_TABLE name: {:?}", name))
    }
}

/// Parse `key` when set; an unparsable value is an error naming the key.
fn parse_var<F, T>(var: &F, key: &str, default: T) -> Result<T, anyhow::Error>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} must be a number, got {:?}", key, value)),
        None => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

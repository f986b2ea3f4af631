//! AWS service clients: Rekognition for faces and text, Comprehend for language
//! identification, Translate for translation.

mod comprehend;
mod rekognition;
mod translate;

pub use comprehend::ComprehendLanguageIdentifier;
pub use rekognition::RekognitionDetector;
pub use translate::TranslateClient;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_rekognition::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use std::error::Error as StdError;
use std::fmt::Debug;

use crate::error::DetectionError;

/// Error codes AWS services use for throttling.
const THROTTLING_CODES: &[&str] = &[
    "ThrottlingException",
    "ProvisionedThroughputExceededException",
    "TooManyRequestsException",
    "LimitExceededException",
];

/// Error codes for failures on the service side.
const SERVER_CODES: &[&str] = &[
    "InternalServerError",
    "InternalServerException",
    "ServiceUnavailableException",
    "ServiceUnavailable",
];

/// All three service clients, built from one shared AWS configuration.
#[derive(Clone)]
pub struct AwsServices {
    pub detector: RekognitionDetector,
    pub language: ComprehendLanguageIdentifier,
    pub translator: TranslateClient,
}

impl AwsServices {
    pub async fn from_region(region: &str) -> Self {
        let config = load_config(region).await;
        Self {
            detector: RekognitionDetector::new(&config),
            language: ComprehendLanguageIdentifier::new(&config),
            translator: TranslateClient::new(&config),
        }
    }
}

/// Load AWS configuration for the given region
pub async fn load_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}

/// Map an SDK error onto the detection error taxonomy.
pub(crate) fn classify_sdk_error<E, R>(service: &'static str, err: SdkError<E, R>) -> DetectionError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug,
{
    let message = DisplayErrorContext(&err).to_string();

    match &err {
        SdkError::ServiceError(service_err) => {
            let code = service_err.err().code().unwrap_or_default();
            if THROTTLING_CODES.contains(&code) {
                DetectionError::Throttled { service, message }
            } else if SERVER_CODES.contains(&code) {
                DetectionError::Unavailable { service, message }
            } else {
                DetectionError::Rejected { service, message }
            }
        }
        SdkError::ConstructionFailure(_) => DetectionError::Rejected { service, message },
        _ => DetectionError::Unavailable { service, message },
    }
}

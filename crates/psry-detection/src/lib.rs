//! Detection service clients
//!
//! The pipeline talks to four remote services through the traits in [`traits`]. Each trait
//! has an AWS implementation (behind the `aws` feature) and a scripted fake in
//! `test_helpers` for tests.

#[cfg(feature = "aws")]
pub mod aws;
pub mod error;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod traits;

#[cfg(feature = "aws")]
pub use aws::{AwsServices, ComprehendLanguageIdentifier, RekognitionDetector, TranslateClient};
pub use error::{DetectionError, DetectionResult};
pub use traits::{FaceDetector, LanguageIdentifier, TextDetector, Translator};

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_comprehend::types::DominantLanguage;
use aws_sdk_comprehend::Client as ComprehendClient;
use psry_core::LanguageScore;

use super::classify_sdk_error;
use crate::error::DetectionResult;
use crate::traits::LanguageIdentifier;

const SERVICE: &str = "comprehend";

#[derive(Clone)]
pub struct ComprehendLanguageIdentifier {
    client: ComprehendClient,
}

impl ComprehendLanguageIdentifier {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: ComprehendClient::new(config),
        }
    }
}

#[async_trait]
impl LanguageIdentifier for ComprehendLanguageIdentifier {
    async fn detect_languages(&self, text: &str) -> DetectionResult<Vec<LanguageScore>> {
        let response = self
            .client
            .detect_dominant_language()
            .text(text)
            .send()
            .await
            .map_err(|e| classify_sdk_error(SERVICE, e))?;

        Ok(rank_languages(response.languages()))
    }
}

/// Comprehend scores are 0-1; rescale to the 0-100 scale used everywhere else, best first.
fn rank_languages(languages: &[DominantLanguage]) -> Vec<LanguageScore> {
    let mut ranked: Vec<LanguageScore> = languages
        .iter()
        .filter_map(|language| {
            let code = language.language_code()?;
            let score = language.score()?;
            Some(LanguageScore::new(code, score * 100.0))
        })
        .collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked
}

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_translate::Client as AwsTranslateClient;

use super::classify_sdk_error;
use crate::error::DetectionResult;
use crate::traits::Translator;

const SERVICE: &str = "translate";

#[derive(Clone)]
pub struct TranslateClient {
    client: AwsTranslateClient,
}

impl TranslateClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: AwsTranslateClient::new(config),
        }
    }
}

#[async_trait]
impl Translator for TranslateClient {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> DetectionResult<String> {
        let response = self
            .client
            .translate_text()
            .text(text)
            .source_language_code(source_language)
            .target_language_code(target_language)
            .send()
            .await
            .map_err(|e| classify_sdk_error(SERVICE, e))?;

        Ok(response.translated_text().to_string())
    }
}

use async_trait::async_trait;
use futures::future::join_all;
use psry_core::{PipelineConfig, PipelineError, StageUpdate};
use psry_db::RecordStore;
use psry_detection::{LanguageIdentifier, Translator};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::StageHandler;
use crate::coordinator::{process_batch, with_timeout, BatchReport, Delivery};
use crate::handoff::{parse_translation_request, StageKind, TranslationRequest};

/// Source language passed to the translator when identification returns nothing.
const AUTO_LANGUAGE: &str = "auto";

/// Translates extracted text into every target language.
pub struct TranslationStage {
    identifier: Arc<dyn LanguageIdentifier>,
    translator: Arc<dyn Translator>,
    store: Arc<dyn RecordStore>,
    target_languages: Vec<String>,
    timeout: Duration,
    concurrency: usize,
}

impl TranslationStage {
    pub fn new(
        identifier: Arc<dyn LanguageIdentifier>,
        translator: Arc<dyn Translator>,
        store: Arc<dyn RecordStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            identifier,
            translator,
            store,
            target_languages: config.target_languages.clone(),
            timeout: config.service_timeout,
            concurrency: config.stage_concurrency,
        }
    }

    /// Translation of `text` into every target language.
    ///
    /// The target matching the detected source language gets the input unchanged. Targets
    /// whose translation fails are left out; if every translated target fails, the whole
    /// request fails.
    pub async fn translate_all(&self, text: &str) -> Result<BTreeMap<String, String>, PipelineError> {
        if text.is_empty() {
            return Ok(self
                .target_languages
                .iter()
                .map(|target| (target.clone(), String::new()))
                .collect());
        }

        let languages = with_timeout(
            "detect_language",
            self.timeout,
            self.identifier.detect_languages(text),
        )
        .await?;
        let source = languages
            .first()
            .map(|language| language.language_code.to_lowercase())
            .unwrap_or_else(|| AUTO_LANGUAGE.to_string());

        let attempts = join_all(self.target_languages.iter().map(|target| {
            let source = source.as_str();
            async move {
                let result = if same_language(source, target) {
                    Ok(text.to_string())
                } else {
                    with_timeout(
                        "translate_text",
                        self.timeout,
                        self.translator.translate(text, source, target),
                    )
                    .await
                };
                (target.clone(), same_language(source, target), result)
            }
        }))
        .await;

        let mut translations = BTreeMap::new();
        let mut first_error = None;
        let mut translated = 0usize;
        let mut attempted = 0usize;

        for (target, identity, result) in attempts {
            if !identity {
                attempted += 1;
            }
            match result {
                Ok(translation) => {
                    if !identity {
                        translated += 1;
                    }
                    translations.insert(target, translation);
                }
                Err(err) => {
                    tracing::warn!(
                        source_language = %source,
                        target_language = %target,
                        error_kind = err.kind(),
                        error = %err,
                        "Translation failed for target"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) if attempted > 0 && translated == 0 => Err(err),
            _ => Ok(translations),
        }
    }

    #[tracing::instrument(skip(self, request), fields(stage = "translation", record_id = %request.id))]
    pub async fn handle_request(&self, request: TranslationRequest) -> Result<(), PipelineError> {
        let translations = self.translate_all(&request.text).await?;
        let languages = translations.len();

        with_timeout(
            "update_record",
            self.timeout,
            self.store
                .update(&request.id, StageUpdate::TextTranslated(translations)),
        )
        .await?;

        tracing::info!(record_id = %request.id, languages, "Text translated");
        Ok(())
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<(), PipelineError> {
        let request = parse_translation_request(&delivery.body)?;
        self.handle_request(request).await
    }
}

/// Language codes match when equal or when their primary subtags are equal (`en`, `en-US`).
fn same_language(source: &str, target: &str) -> bool {
    let primary = |code: &str| code.split(['-', '_']).next().unwrap_or(code).to_lowercase();
    source.eq_ignore_ascii_case(target) || primary(source) == primary(target)
}

#[async_trait]
impl StageHandler for TranslationStage {
    fn stage(&self) -> StageKind {
        StageKind::Translation
    }

    async fn handle_batch(&self, deliveries: Vec<Delivery>) -> BatchReport {
        process_batch(self.stage(), deliveries, self.concurrency, |delivery| {
            self.handle_delivery(delivery)
        })
        .await
    }
}

// Text translation over an Ollama-style HTTP endpoint, plus the chunked
// engine that feeds size-bounded slices of a subtitle document through it.

pub mod chunker;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TranslateConfig;
use crate::error::{Result, TarjimError};
use crate::stop::StopToken;

pub use chunker::{ChunkedTranslator, TranslationReport, split_into_chunks};

/// Text translation seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate one chunk of serialized subtitle text. Blocks for the
    /// duration of the HTTP call, bounded by the configured timeout. The
    /// caller decides whether a failure falls back to the source text.
    async fn translate_chunk(
        &self,
        text: &str,
        target_language: &str,
        stop: &StopToken,
    ) -> Result<String>;

    /// Verify the endpoint is reachable and the model is loaded.
    async fn check_health(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
struct TranslationRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: TranslationOptions,
}

#[derive(Debug, Clone, Serialize)]
struct TranslationOptions {
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct TranslationResponse {
    response: String,
}

/// Ollama-backed translator with fixed decoding parameters so output stays
/// deterministic enough for review.
pub struct OllamaTranslator {
    client: Client,
    config: TranslateConfig,
}

impl OllamaTranslator {
    pub fn new(config: TranslateConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TarjimError::Translate(format!("HTTP client creation failed: {}", e)))?;

        Ok(Self { client, config })
    }

    fn build_prompt(&self, text: &str, target_language: &str) -> String {
        let language_name = language_code_to_name(target_language);
        format!(
            "Please translate the following subtitle text to {}. Keep the timing format intact and translate only the text content:\n\
             \n\
             {}\n\
             \n\
             Important instructions:\n\
             - Maintain all SRT formatting (timestamps, line numbers)\n\
             - Translate only the dialogue text, not the timestamps\n\
             - Keep the same structure and line breaks\n\
             - Use natural, fluent {}\n\
             - For proper nouns (names, places), use appropriate {} transliteration",
            language_name, text, language_name, language_name
        )
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn translate_chunk(
        &self,
        text: &str,
        target_language: &str,
        stop: &StopToken,
    ) -> Result<String> {
        let request = TranslationRequest {
            model: self.config.model.clone(),
            prompt: self.build_prompt(text, target_language),
            stream: false,
            options: TranslationOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                max_tokens: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        debug!("Sending translation request to {}", url);

        let send = self.client.post(&url).json(&request).send();
        let response = tokio::select! {
            response = send => response
                .map_err(|e| TarjimError::Translate(format!("HTTP request failed: {}", e)))?,
            _ = stop.cancelled() => {
                return Err(TarjimError::Translate("Interrupted by stop request".to_string()));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(TarjimError::Translate(format!(
                "Translation API error {}: {}",
                status, error_text
            )));
        }

        let translation: TranslationResponse = response
            .json()
            .await
            .map_err(|e| TarjimError::Translate(format!("Failed to parse response: {}", e)))?;

        let text = translation.response.trim().to_string();
        if text.is_empty() {
            return Err(TarjimError::Translate(
                "Empty translation received".to_string(),
            ));
        }

        Ok(text)
    }

    async fn check_health(&self) -> Result<()> {
        let url = format!("{}/api/show", self.config.endpoint);
        let request = json!({ "name": self.config.model });

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                TarjimError::Translate(format!("Failed to connect to translation endpoint: {}", e))
            })?;

        if response.status().is_success() {
            info!("Translation model '{}' is available", self.config.model);
            Ok(())
        } else {
            Err(TarjimError::Translate(format!(
                "Translation model '{}' not found at {}",
                self.config.model, self.config.endpoint
            )))
        }
    }
}

/// Convert a language code to a full name for clearer prompts.
fn language_code_to_name(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "ar" => "Arabic",
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "ru" => "Russian",
        "it" => "Italian",
        "pt" => "Portuguese",
        "pl" => "Polish",
        "nl" => "Dutch",
        "tr" => "Turkish",
        "hi" => "Hindi",
        "fa" => "Persian",
        "he" => "Hebrew",
        "uk" => "Ukrainian",
        "sv" => "Swedish",
        "fi" => "Finnish",
        other => return other.to_string(),
    }
    .to_string()
}

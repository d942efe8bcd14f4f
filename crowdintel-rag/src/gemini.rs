//! Gemini text generation over the `generateContent` REST endpoint.
//!
//! This module is only available when the `gemini` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generation::{GenerationRequest, TextGenerator};
use crate::http::{self, Upstream};

/// The default Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default generation model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

const PROVIDER: &str = "Gemini";

/// A [`TextGenerator`] backed by the Gemini API.
///
/// # Example
///
/// ```rust,ignore
/// use crowdintel_rag::gemini::GeminiGenerator;
///
/// let generator = GeminiGenerator::new(api_key)?;
/// let text = generator.generate(&request).await?;
/// ```
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGenerator {
    /// Create a generator for the default model with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `api_key` is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("Gemini API key must not be empty".into()));
        }

        Ok(Self {
            client: http::build_client(http::DEFAULT_REQUEST_TIMEOUT)?,
            api_key,
            model: DEFAULT_GEMINI_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
        })
    }

    /// Set the model name (e.g. `gemini-2.5-pro`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http::build_client(timeout)?;
        Ok(self)
    }

    fn endpoint(&self) -> String {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        format!("{}/models/{model}:generateContent", self.base_url)
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> Result<String> {
        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            RagError::GenerationError {
                provider: PROVIDER.into(),
                message: "response contained no candidates".into(),
            }
        })?;
        let finish_reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
        let text: String = candidate
            .content
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(RagError::GenerationError {
                provider: PROVIDER.into(),
                message: format!("response contained no text (finish reason: {finish_reason})"),
            });
        }
        Ok(text)
    }
}

// ── TextGenerator implementation ───────────────────────────────────

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_len = request.prompt.len(),
            temperature = request.temperature,
            max_output_tokens = request.max_output_tokens,
            idempotency_key = %request.idempotency_key,
            "generating content"
        );

        let body = GenerateContentRequest {
            contents: [Content { role: "user", parts: [RequestPart { text: &request.prompt }] }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::request_error(PROVIDER, Upstream::Generation, e))?;

        if !response.status().is_success() {
            return Err(http::status_error(PROVIDER, Upstream::Generation, response).await);
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| http::decode_error(PROVIDER, e))?;
        parsed.into_text().inspect_err(|e| error!(provider = PROVIDER, error = %e, "empty generation"))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_body_uses_gemini_field_names() {
        let body = GenerateContentRequest {
            contents: [Content { role: "user", parts: [RequestPart { text: "hello" }] }],
            generation_config: GenerationConfig { temperature: 0.0, max_output_tokens: 512 },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "generationConfig": {"temperature": 0.0, "maxOutputTokens": 512}
            })
        );
    }

    #[test]
    fn response_text_parts_are_concatenated() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Modular products win. "}, {"text": "[Source: a.txt]"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "Modular products win. [Source: a.txt]");
    }

    #[test]
    fn blocked_response_is_a_generation_error() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
        let err = response.into_text().unwrap_err();
        assert!(matches!(err, RagError::GenerationError { ref message, .. } if message.contains("SAFETY")));
    }

    #[test]
    fn endpoint_accepts_prefixed_model_names() {
        let generator = GeminiGenerator::new("key")
            .unwrap()
            .with_model("models/gemini-2.5-pro")
            .with_base_url("http://localhost:8080/");
        assert_eq!(generator.endpoint(), "http://localhost:8080/models/gemini-2.5-pro:generateContent");
    }

    #[test]
    fn empty_key_is_a_config_error() {
        assert!(matches!(GeminiGenerator::new("  "), Err(RagError::ConfigError(_))));
    }
}

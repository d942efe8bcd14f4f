//! Hugging Face feature-extraction embeddings.
//!
//! This module is only available when the `huggingface` feature is enabled.
//!
//! Depending on the model, the feature-extraction pipeline returns either a
//! pooled sentence vector or one vector per token for each input. Both come
//! back as [`RawEmbedding`]s and are flattened by the encoder.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::embedding::{EmbeddingProvider, RawEmbedding};
use crate::error::{RagError, Result};
use crate::http::{self, Upstream};

/// The default sentence-transformers model.
pub const DEFAULT_HF_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

const HF_INFERENCE_BASE_URL: &str = "https://router.huggingface.co/hf-inference/models";

const PROVIDER: &str = "HuggingFace";

/// An [`EmbeddingProvider`] backed by a Hugging Face feature-extraction
/// endpoint, either the hosted inference API or a self-hosted
/// text-embeddings-inference server.
pub struct HuggingFaceEmbeddingProvider {
    client: reqwest::Client,
    token: Option<String>,
    model: String,
    endpoint: String,
}

impl HuggingFaceEmbeddingProvider {
    /// Create a provider for [`DEFAULT_HF_MODEL`] on the hosted inference API.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http::build_client(http::DEFAULT_REQUEST_TIMEOUT)?,
            token: None,
            model: DEFAULT_HF_MODEL.into(),
            endpoint: hosted_endpoint(DEFAULT_HF_MODEL),
        })
    }

    /// Authenticate with an access token. Blank tokens are ignored.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.trim().is_empty()).then_some(token);
        self
    }

    /// Use a different hosted model. Resets the endpoint to the hosted API.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.endpoint = hosted_endpoint(&self.model);
        self
    }

    /// Send requests to a custom feature-extraction URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http::build_client(timeout)?;
        Ok(self)
    }

    /// The feature-extraction URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn hosted_endpoint(model: &str) -> String {
    format!("{HF_INFERENCE_BASE_URL}/{model}/pipeline/feature-extraction")
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [&'a str],
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

/// Split a batch response into one raw embedding per input.
fn parse_batch(body: &Value, expected: usize) -> Result<Vec<RawEmbedding>> {
    let Value::Array(items) = body else {
        return Err(RagError::MalformedResponse {
            backend: PROVIDER.into(),
            message: "expected a JSON array of embeddings".into(),
        });
    };
    if items.len() != expected {
        return Err(RagError::ShapeMismatch(format!(
            "{PROVIDER} returned {} embeddings for {expected} inputs",
            items.len()
        )));
    }
    items.iter().map(RawEmbedding::from_json).collect()
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<RawEmbedding> {
        let mut results = self.embed_batch(&[text]).await?;
        results.pop().ok_or_else(|| RagError::MalformedResponse {
            backend: PROVIDER.into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<RawEmbedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body = FeatureExtractionRequest {
            inputs: texts,
            options: RequestOptions { wait_for_model: true },
        };
        let mut request = self.client.post(&self.endpoint).json(&request_body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| http::request_error(PROVIDER, Upstream::Embedding, e))?;

        if !response.status().is_success() {
            return Err(http::status_error(PROVIDER, Upstream::Embedding, response).await);
        }

        let body: Value = response.json().await.map_err(|e| http::decode_error(PROVIDER, e))?;
        parse_batch(&body, texts.len())
            .inspect_err(|e| error!(provider = PROVIDER, error = %e, "unusable response"))
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
    fn pooled_and_token_level_responses_are_both_accepted() {
        let pooled = parse_batch(&json!([[0.1, 0.2], [0.3, 0.4]]), 2).unwrap();
        assert!(pooled.iter().all(|e| e.rank() == 1));

        let per_token = parse_batch(&json!([[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]]), 1).unwrap();
        assert_eq!(per_token[0].shape(), &[3, 2]);
    }

    #[test]
    fn error_objects_are_malformed() {
        let err = parse_batch(&json!({"error": "loading"}), 1).unwrap_err();
        assert!(matches!(err, RagError::MalformedResponse { .. }));
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let err = parse_batch(&json!([[0.1]]), 2).unwrap_err();
        assert!(matches!(err, RagError::ShapeMismatch(_)));
    }

    #[test]
    fn model_switch_updates_hosted_endpoint() {
        let provider = HuggingFaceEmbeddingProvider::new().unwrap().with_model("BAAI/bge-small-en-v1.5");
        assert_eq!(
            provider.endpoint(),
            "https://router.huggingface.co/hf-inference/models/BAAI/bge-small-en-v1.5/pipeline/feature-extraction"
        );
        let provider = provider.with_endpoint("http://localhost:8080/embed");
        assert_eq!(provider.endpoint(), "http://localhost:8080/embed");
        assert_eq!(provider.model(), "BAAI/bge-small-en-v1.5");
    }

    #[test]
    fn blank_token_is_ignored() {
        let provider = HuggingFaceEmbeddingProvider::new().unwrap().with_token(" ");
        assert!(provider.token.is_none());
    }
}

//! Configuration for the RAG components.
//!
//! [`RagConfig`] holds every tunable with defaults matching the reference
//! deployment. Values can be overlaid from `CROWDINTEL_*` environment
//! variables with [`RagConfig::from_env`]. API keys live separately in
//! [`Credentials`] so a config can be logged or serialised safely.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::DEFAULT_MAX_CHARS_PER_DOC;
use crate::error::{RagError, Result};
use crate::generation::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE};
use crate::ingest::GENERATION_SEPARATOR;
use crate::retry::RetryPolicy;

/// Default corpus directory.
pub const DEFAULT_CORPUS_DIR: &str = "docs";
/// Default persisted index directory.
pub const DEFAULT_INDEX_DIR: &str = "chroma_store";
/// Default collection alias.
pub const DEFAULT_COLLECTION: &str = "crowdfunding_docs";
/// Default number of documents retrieved per question.
pub const DEFAULT_TOP_K: usize = 3;
/// Default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration parameters for ingestion, retrieval and synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Directory holding the `*.txt` corpus.
    pub corpus_dir: PathBuf,
    /// Directory holding the persisted collections.
    pub index_dir: PathBuf,
    /// Alias under which the current collection generation is published.
    pub collection: String,
    /// Number of documents retrieved per question.
    pub top_k: usize,
    /// Per-document character budget in the context block.
    pub max_chars_per_doc: usize,
    /// Sampling temperature for generation.
    pub temperature: f32,
    /// Output token budget for generation.
    pub max_output_tokens: u32,
    /// Timeout applied to every HTTP call, in seconds.
    pub request_timeout_secs: u64,
    /// Generation model name.
    pub generation_model: String,
    /// Embedding model override; `None` keeps the backend's default.
    pub embedding_model: Option<String>,
    /// Retry policy for embedding and generation calls.
    pub retry: RetryPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from(DEFAULT_CORPUS_DIR),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            collection: DEFAULT_COLLECTION.to_string(),
            top_k: DEFAULT_TOP_K,
            max_chars_per_doc: DEFAULT_MAX_CHARS_PER_DOC,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Defaults overlaid with `CROWDINTEL_*` environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `CROWDINTEL_CORPUS_DIR` | `corpus_dir` |
    /// | `CROWDINTEL_INDEX_DIR` | `index_dir` |
    /// | `CROWDINTEL_COLLECTION` | `collection` |
    /// | `CROWDINTEL_TOP_K` | `top_k` |
    /// | `CROWDINTEL_MAX_CHARS_PER_DOC` | `max_chars_per_doc` |
    /// | `CROWDINTEL_TEMPERATURE` | `temperature` |
    /// | `CROWDINTEL_MAX_OUTPUT_TOKENS` | `max_output_tokens` |
    /// | `CROWDINTEL_TIMEOUT_SECS` | `request_timeout_secs` |
    /// | `CROWDINTEL_GENERATION_MODEL` | `generation_model` |
    /// | `CROWDINTEL_EMBEDDING_MODEL` | `embedding_model` |
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a variable cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(dir) = lookup("CROWDINTEL_CORPUS_DIR") {
            builder = builder.corpus_dir(dir);
        }
        if let Some(dir) = lookup("CROWDINTEL_INDEX_DIR") {
            builder = builder.index_dir(dir);
        }
        if let Some(name) = lookup("CROWDINTEL_COLLECTION") {
            builder = builder.collection(name);
        }
        if let Some(k) = parse_var(&lookup, "CROWDINTEL_TOP_K")? {
            builder = builder.top_k(k);
        }
        if let Some(chars) = parse_var(&lookup, "CROWDINTEL_MAX_CHARS_PER_DOC")? {
            builder = builder.max_chars_per_doc(chars);
        }
        if let Some(temperature) = parse_var(&lookup, "CROWDINTEL_TEMPERATURE")? {
            builder = builder.temperature(temperature);
        }
        if let Some(tokens) = parse_var(&lookup, "CROWDINTEL_MAX_OUTPUT_TOKENS")? {
            builder = builder.max_output_tokens(tokens);
        }
        if let Some(secs) = parse_var(&lookup, "CROWDINTEL_TIMEOUT_SECS")? {
            builder = builder.request_timeout_secs(secs);
        }
        if let Some(model) = lookup("CROWDINTEL_GENERATION_MODEL") {
            builder = builder.generation_model(model);
        }
        if let Some(model) = lookup("CROWDINTEL_EMBEDDING_MODEL") {
            builder = builder.embedding_model(model);
        }
        builder.build()
    }

    /// A builder seeded with this configuration, for applying overrides.
    pub fn to_builder(&self) -> RagConfigBuilder {
        RagConfigBuilder { config: self.clone() }
    }

    /// The HTTP timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| RagError::ConfigError(format!("invalid value '{raw}' for {key}: {e}")))
        })
        .transpose()
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the corpus directory.
    pub fn corpus_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.corpus_dir = dir.into();
        self
    }

    /// Set the persisted index directory.
    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.index_dir = dir.into();
        self
    }

    /// Set the collection alias.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Set the number of documents retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the per-document character budget.
    pub fn max_chars_per_doc(mut self, chars: usize) -> Self {
        self.config.max_chars_per_doc = chars;
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the output token budget.
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.config.max_output_tokens = tokens;
        self
    }

    /// Set the HTTP timeout in seconds.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the generation model.
    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation_model = model.into();
        self
    }

    /// Override the embedding model.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = Some(model.into());
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `top_k == 0` or `max_chars_per_doc == 0`
    /// - `temperature` is outside `[0.0, 2.0]`
    /// - `max_output_tokens == 0` or `request_timeout_secs == 0`
    /// - the collection alias is empty or contains the generation separator
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if config.max_chars_per_doc == 0 {
            return Err(RagError::ConfigError(
                "max_chars_per_doc must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(RagError::ConfigError(format!(
                "temperature ({}) must be between 0.0 and 2.0",
                config.temperature
            )));
        }
        if config.max_output_tokens == 0 {
            return Err(RagError::ConfigError(
                "max_output_tokens must be greater than zero".to_string(),
            ));
        }
        if config.request_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if config.collection.trim().is_empty() {
            return Err(RagError::ConfigError("collection name must not be empty".to_string()));
        }
        if config.collection.contains(GENERATION_SEPARATOR) {
            return Err(RagError::ConfigError(format!(
                "collection name '{}' must not contain '{GENERATION_SEPARATOR}'",
                config.collection
            )));
        }
        Ok(config)
    }
}

/// API credentials read from the process environment.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Key for the Gemini API (`GEMINI_API_KEY`, else `GOOGLE_API_KEY`).
    pub gemini_api_key: Option<String>,
    /// Key for the OpenAI API (`OPENAI_API_KEY`).
    pub openai_api_key: Option<String>,
    /// Hugging Face access token (`HF_TOKEN`).
    pub huggingface_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("huggingface_token", &redact(&self.huggingface_token))
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment. Blank values count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            gemini_api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            openai_api_key: get("OPENAI_API_KEY"),
            huggingface_token: get("HF_TOKEN"),
        }
    }

    /// The Gemini key, required before any generation call.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] when neither variable is set.
    pub fn require_gemini(&self) -> Result<&str> {
        self.gemini_api_key.as_deref().ok_or_else(|| {
            RagError::ConfigError("GEMINI_API_KEY (or GOOGLE_API_KEY) is not set".to_string())
        })
    }

    /// The OpenAI key, required by the OpenAI embedding backend.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] when `OPENAI_API_KEY` is not set.
    pub fn require_openai(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| RagError::ConfigError("OPENAI_API_KEY is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let config = RagConfig::default();
        assert_eq!(config.corpus_dir, PathBuf::from("docs"));
        assert_eq!(config.index_dir, PathBuf::from("chroma_store"));
        assert_eq!(config.collection, "crowdfunding_docs");
        assert_eq!(config.top_k, 3);
        assert_eq!(config.max_chars_per_doc, 4000);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_output_tokens, 512);
        assert_eq!(config.generation_model, "gemini-2.5-flash");
        assert!(RagConfig::builder().build().is_ok());
    }

    #[test]
    fn builder_rejects_invalid_values() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().max_chars_per_doc(0).build().is_err());
        assert!(RagConfig::builder().temperature(2.5).build().is_err());
        assert!(RagConfig::builder().temperature(f32::NAN).build().is_err());
        assert!(RagConfig::builder().max_output_tokens(0).build().is_err());
        assert!(RagConfig::builder().collection(" ").build().is_err());
        assert!(RagConfig::builder().collection("docs__gen_1").build().is_err());
    }

    #[test]
    fn environment_overlays_defaults() {
        let config = RagConfig::from_lookup(env(&[
            ("CROWDINTEL_TOP_K", "5"),
            ("CROWDINTEL_COLLECTION", "campaigns"),
            ("CROWDINTEL_EMBEDDING_MODEL", "text-embedding-3-large"),
        ]))
        .unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.collection, "campaigns");
        assert_eq!(config.embedding_model.as_deref(), Some("text-embedding-3-large"));
        assert_eq!(config.max_chars_per_doc, 4000);
    }

    #[test]
    fn unparseable_environment_value_is_a_config_error() {
        let err = RagConfig::from_lookup(env(&[("CROWDINTEL_TOP_K", "three")])).unwrap_err();
        assert!(matches!(err, RagError::ConfigError(ref m) if m.contains("CROWDINTEL_TOP_K")));
    }

    #[test]
    fn gemini_key_falls_back_to_google_key() {
        let creds = Credentials::from_lookup(env(&[("GOOGLE_API_KEY", "g-key")]));
        assert_eq!(creds.require_gemini().unwrap(), "g-key");

        let creds =
            Credentials::from_lookup(env(&[("GEMINI_API_KEY", "primary"), ("GOOGLE_API_KEY", "g")]));
        assert_eq!(creds.require_gemini().unwrap(), "primary");
    }

    #[test]
    fn missing_or_blank_key_is_a_config_error() {
        let creds = Credentials::from_lookup(env(&[("GEMINI_API_KEY", "  ")]));
        assert!(matches!(creds.require_gemini(), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn debug_output_redacts_keys() {
        let creds = Credentials::from_lookup(env(&[("OPENAI_API_KEY", "sk-secret")]));
        assert!(!format!("{creds:?}").contains("sk-secret"));
    }
}

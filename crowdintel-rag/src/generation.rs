//! Text generation trait consumed by the answer synthesizer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default sampling temperature; zero keeps answers reproducible.
pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Default output token budget.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;

/// A single generation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// The fully rendered prompt.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
    /// Key shared by every retry of this request, for backends that
    /// deduplicate on it.
    pub idempotency_key: String,
}

/// A backend that turns a prompt into text.
///
/// # Example
///
/// ```rust,ignore
/// use crowdintel_rag::{GenerationRequest, TextGenerator};
///
/// let text = generator.generate(&request).await?;
/// ```
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Identifier of the generation model.
    fn model(&self) -> &str;
}

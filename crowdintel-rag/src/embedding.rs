//! Embedding providers and the flattening encoder.
//!
//! Backends do not all agree on what "one embedding" looks like: a sentence
//! embedding endpoint returns a single vector per input, while a raw
//! feature-extraction endpoint may return one row per token. Providers hand
//! back a [`RawEmbedding`] and the [`EmbeddingEncoder`] reduces it to exactly
//! one vector per input. Ingestion and retrieval both go through the encoder,
//! so documents and queries are always normalised the same way.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::retry::{RetryPolicy, retry_with_backoff};

/// An embedding as returned by a backend, before flattening.
///
/// Values are stored row-major alongside their shape. A single vector has
/// shape `[dim]`, a per-token matrix has shape `[rows, dim]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEmbedding {
    shape: Vec<usize>,
    values: Vec<f32>,
}

impl RawEmbedding {
    /// A rank-1 embedding.
    pub fn vector(values: Vec<f32>) -> Self {
        Self { shape: vec![values.len()], values }
    }

    /// A rank-2 embedding, one row per token or chunk.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingShape`] if the rows have different lengths.
    pub fn rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|row| row.len() != width) {
            return Err(RagError::EmbeddingShape {
                shape: vec![rows.len(), width],
                message: format!("ragged rows: expected width {width}, found {}", bad.len()),
            });
        }
        let shape = vec![rows.len(), width];
        Ok(Self { shape, values: rows.into_iter().flatten().collect() })
    }

    /// Parse an arbitrarily nested JSON array of numbers.
    ///
    /// The shape is taken from the first element at each depth; every other
    /// array at that depth must have the same length.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingShape`] for ragged arrays and
    /// [`RagError::MalformedResponse`] for non-numeric entries.
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut shape = Vec::new();
        let mut cursor = value;
        while let Value::Array(items) = cursor {
            shape.push(items.len());
            match items.first() {
                Some(first) => cursor = first,
                None => break,
            }
        }

        let mut values = Vec::with_capacity(shape.iter().product());
        collect_values(value, 0, &shape, &mut values)?;
        Ok(Self { shape, values })
    }

    /// The number of dimensions of the raw result.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// The shape of the raw result.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Reduce to exactly one vector.
    ///
    /// Rank 1 is returned unchanged; rank 2 is averaged element-wise across
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingShape`] for any other rank, for an empty
    /// vector, and for a matrix without rows.
    pub fn flatten(self) -> Result<Vec<f32>> {
        match *self.shape.as_slice() {
            [0] => Err(self.shape_error("embedding vector is empty")),
            [_] => Ok(self.values),
            [0, _] => Err(self.shape_error("embedding matrix has no rows")),
            [_, 0] => Err(self.shape_error("embedding matrix rows are empty")),
            [rows, width] => {
                let mut sums = vec![0.0f64; width];
                for row in self.values.chunks_exact(width) {
                    for (sum, value) in sums.iter_mut().zip(row) {
                        *sum += f64::from(*value);
                    }
                }
                Ok(sums.into_iter().map(|sum| (sum / rows as f64) as f32).collect())
            }
            _ => Err(self.shape_error("expected rank 1 or 2")),
        }
    }

    fn shape_error(&self, message: &str) -> RagError {
        RagError::EmbeddingShape { shape: self.shape.clone(), message: message.to_string() }
    }
}

fn collect_values(value: &Value, depth: usize, shape: &[usize], out: &mut Vec<f32>) -> Result<()> {
    match value {
        Value::Array(items) => {
            if depth >= shape.len() || items.len() != shape[depth] {
                return Err(RagError::EmbeddingShape {
                    shape: shape.to_vec(),
                    message: format!("ragged array at depth {depth}"),
                });
            }
            items.iter().try_for_each(|item| collect_values(item, depth + 1, shape, out))
        }
        Value::Number(number) => {
            if depth != shape.len() {
                return Err(RagError::EmbeddingShape {
                    shape: shape.to_vec(),
                    message: format!("number found at depth {depth}"),
                });
            }
            let value = number.as_f64().ok_or_else(|| RagError::MalformedResponse {
                backend: "embedding".into(),
                message: format!("unrepresentable embedding value {number}"),
            })?;
            out.push(value as f32);
            Ok(())
        }
        other => Err(RagError::MalformedResponse {
            backend: "embedding".into(),
            message: format!("expected a number or array, found {other}"),
        }),
    }
}

/// A provider that generates raw embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate a raw embedding for a single text input.
    async fn embed(&self, text: &str) -> Result<RawEmbedding>;

    /// Generate raw embeddings for a batch of text inputs, one per input.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<RawEmbedding>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Identifier of the model (and version) producing the embeddings.
    fn model(&self) -> &str;
}

/// Turns text into flattened vectors through an [`EmbeddingProvider`].
///
/// Provider calls are wrapped in the configured [`RetryPolicy`].
#[derive(Clone)]
pub struct EmbeddingEncoder {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
}

impl EmbeddingEncoder {
    /// Create an encoder with the default retry policy.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider, retry: RetryPolicy::default() }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The model identifier of the underlying provider.
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Encode a single text into one vector.
    pub async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let raw = retry_with_backoff(|| self.provider.embed(text), &self.retry, "embed").await?;
        debug!(model = self.model(), shape = ?raw.shape(), "encoded text");
        raw.flatten()
    }

    /// Encode a batch of texts in a single provider call.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any input cannot be flattened, if the provider
    /// returns a different number of embeddings than inputs, or if the
    /// flattened vectors disagree on dimensionality.
    pub async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let raw =
            retry_with_backoff(|| self.provider.embed_batch(texts), &self.retry, "embed_batch")
                .await?;
        if raw.len() != texts.len() {
            return Err(RagError::ShapeMismatch(format!(
                "provider '{}' returned {} embeddings for {} inputs",
                self.model(),
                raw.len(),
                texts.len()
            )));
        }

        let vectors = raw.into_iter().map(RawEmbedding::flatten).collect::<Result<Vec<_>>>()?;
        let dimensions = vectors[0].len();
        if let Some(position) = vectors.iter().position(|v| v.len() != dimensions) {
            return Err(RagError::ShapeMismatch(format!(
                "embedding {position} has {} dimensions, expected {dimensions}",
                vectors[position].len()
            )));
        }

        debug!(model = self.model(), batch_size = vectors.len(), dimensions, "encoded batch");
        Ok(vectors)
    }
}

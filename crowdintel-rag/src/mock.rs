//! Deterministic offline collaborators for tests and local runs.
//!
//! [`MockEmbeddingProvider`] hashes lowercase word tokens into a fixed number
//! of buckets, so texts sharing words land close together without any model.
//! [`MockGenerator`] records every request and replies with a canned answer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::embedding::{EmbeddingProvider, RawEmbedding};
use crate::error::{RagError, Result};
use crate::generation::{GenerationRequest, TextGenerator};

/// Default number of hash buckets.
pub const DEFAULT_MOCK_DIMENSIONS: usize = 1024;

const MOCK_EMBEDDING_MODEL: &str = "mock-bag-of-words";
const MOCK_GENERATION_MODEL: &str = "mock-generator";

/// Consume one injected failure, if any remain.
fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

fn injected(provider: &str) -> RagError {
    RagError::Transport { provider: provider.into(), message: "injected transient failure".into() }
}

/// Hashed bag-of-words embeddings.
///
/// In pooled mode (the default) each text becomes one L2-normalised vector
/// of token counts. In token mode each token becomes its own one-hot row,
/// which exercises the encoder's rank-2 flattening; averaging those rows
/// points in the same direction as the pooled vector.
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    model: String,
    per_token: bool,
    failures: AtomicUsize,
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_MOCK_DIMENSIONS)
    }
}

impl MockEmbeddingProvider {
    /// A pooled provider with `dimensions` buckets.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            model: MOCK_EMBEDDING_MODEL.into(),
            per_token: false,
            failures: AtomicUsize::new(0),
        }
    }

    /// Report a different model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Return one row per token instead of a pooled vector.
    pub fn per_token(mut self) -> Self {
        self.per_token = true;
        self
    }

    /// Fail the next `count` calls with a retryable transport error.
    pub fn with_transient_failures(self, count: usize) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    fn bucket(&self, token: &str) -> usize {
        // 64-bit FNV-1a
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dimensions as u64) as usize
    }

    fn pooled(&self, tokens: &[String]) -> Vec<f32> {
        let mut counts = vec![0.0f32; self.dimensions];
        for token in tokens {
            counts[self.bucket(token)] += 1.0;
        }
        let norm = counts.iter().map(|c| c * c).sum::<f32>().sqrt();
        if norm > 0.0 {
            counts.iter_mut().for_each(|c| *c /= norm);
        }
        counts
    }

    fn one_hot_rows(&self, tokens: &[String]) -> Result<RawEmbedding> {
        let rows = tokens
            .iter()
            .map(|token| {
                let mut row = vec![0.0f32; self.dimensions];
                row[self.bucket(token)] = 1.0;
                row
            })
            .collect();
        RawEmbedding::rows(rows)
    }
}

/// Lowercase alphanumeric tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<RawEmbedding> {
        if take_failure(&self.failures) {
            return Err(injected(&self.model));
        }
        let tokens = tokenize(text);
        if self.per_token {
            self.one_hot_rows(&tokens)
        } else {
            Ok(RawEmbedding::vector(self.pooled(&tokens)))
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// A generator that echoes a fixed reply and remembers what it was asked.
#[derive(Debug)]
pub struct MockGenerator {
    reply: String,
    calls: Mutex<Vec<GenerationRequest>>,
    failures: AtomicUsize,
}

impl MockGenerator {
    /// Reply with `reply` to every request.
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), calls: Mutex::new(Vec::new()), failures: AtomicUsize::new(0) }
    }

    /// Fail the next `count` calls with a retryable transport error.
    pub fn with_transient_failures(self, count: usize) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    /// Every request received so far, including failed attempts.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());
        if take_failure(&self.failures) {
            return Err(injected(MOCK_GENERATION_MODEL));
        }
        Ok(self.reply.clone())
    }

    fn model(&self) -> &str {
        MOCK_GENERATION_MODEL
    }
}

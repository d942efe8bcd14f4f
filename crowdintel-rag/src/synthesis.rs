//! Grounded answer synthesis.
//!
//! A question moves through these states:
//!
//! ```text
//! RECEIVED -> EMBEDDED -> RETRIEVED -> NO_CONTEXT            (0 documents)
//!                                   -> CONTEXT_BUILT -> PROMPTED -> ANSWERED
//! ```
//!
//! `EMBEDDED` is emitted by [`RetrievalEngine`] once the question is encoded.
//! An empty collection is detected before encoding, so that path goes
//! straight from `RECEIVED` to `RETRIEVED`.
//!
//! With no documents the fixed [`FALLBACK_ANSWER`] is returned and the
//! generator is never called.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RagConfig;
use crate::context::ContextAssembler;
use crate::document::RetrievedDocument;
use crate::error::Result;
use crate::generation::{
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE, GenerationRequest, TextGenerator,
};
use crate::prompt::{FALLBACK_ANSWER, PromptTemplate};
use crate::retrieval::RetrievalEngine;
use crate::retry::{RetryPolicy, retry_with_backoff};

/// How an [`Answer`] was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Nothing was retrieved; the answer is the fallback sentence.
    NoContext,
    /// The generator answered from retrieved context.
    Generated,
}

/// A synthesized answer with its supporting documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The question as asked.
    pub question: String,
    /// The trimmed answer text.
    pub answer: String,
    /// Whether the generator was involved.
    pub outcome: AnswerOutcome,
    /// The retrieved documents, nearest first.
    pub documents: Vec<RetrievedDocument>,
    /// The rendered prompt, absent when no context was found.
    pub prompt: Option<String>,
}

/// Retrieves context for a question and asks a [`TextGenerator`] to answer
/// from it.
///
/// # Example
///
/// ```rust,ignore
/// use crowdintel_rag::{AnswerSynthesizer, RetrievalEngine};
///
/// let synthesizer = AnswerSynthesizer::new(engine, Arc::new(generator));
/// let answer = synthesizer.answer("What matters for design campaigns?", 3).await?;
/// ```
pub struct AnswerSynthesizer {
    retrieval: RetrievalEngine,
    generator: Arc<dyn TextGenerator>,
    assembler: ContextAssembler,
    template: PromptTemplate,
    temperature: f32,
    max_output_tokens: u32,
    retry: RetryPolicy,
}

impl AnswerSynthesizer {
    /// Create a synthesizer with the default template and sampling settings.
    pub fn new(retrieval: RetrievalEngine, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            retrieval,
            generator,
            assembler: ContextAssembler::default(),
            template: PromptTemplate::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            retry: RetryPolicy::default(),
        }
    }

    /// Create a synthesizer using the budgets and sampling settings in `config`.
    pub fn from_config(
        config: &RagConfig,
        retrieval: RetrievalEngine,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self> {
        Ok(Self::new(retrieval, generator)
            .with_assembler(ContextAssembler::new(config.max_chars_per_doc)?)
            .with_sampling(config.temperature, config.max_output_tokens)
            .with_retry(config.retry.clone()))
    }

    /// Replace the context assembler.
    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Replace the prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Set the temperature and output token budget.
    pub fn with_sampling(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Replace the retry policy around the generation call.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Render the prompt that would be sent for `documents`.
    pub fn render_prompt(&self, question: &str, documents: &[RetrievedDocument]) -> String {
        let context = self.assembler.assemble(documents);
        self.template.render(&context, question)
    }

    /// Answer `question` from the `top_k` nearest documents.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`](crate::RagError::InvalidArgument)
    /// for a zero `top_k`; retrieval and generation failures are passed
    /// through. Any question, even an empty one, gets the fallback answer
    /// when nothing is retrieved.
    pub async fn answer(&self, question: &str, top_k: usize) -> Result<Answer> {
        debug!(state = "RECEIVED", question_len = question.len(), top_k);

        let documents = self.retrieval.retrieve(question, top_k).await?;
        debug!(state = "RETRIEVED", document_count = documents.len());

        if documents.is_empty() {
            info!(outcome = "no_context", "no documents retrieved, returning fallback answer");
            return Ok(Answer {
                question: question.to_string(),
                answer: FALLBACK_ANSWER.to_string(),
                outcome: AnswerOutcome::NoContext,
                documents,
                prompt: None,
            });
        }

        let context = self.assembler.assemble(&documents);
        debug!(state = "CONTEXT_BUILT", context_chars = context.as_str().chars().count());

        let request = GenerationRequest {
            prompt: self.template.render(&context, question),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            idempotency_key: Uuid::new_v4().to_string(),
        };
        debug!(
            state = "PROMPTED",
            model = self.generator.model(),
            idempotency_key = %request.idempotency_key,
            prompt_len = request.prompt.len()
        );

        let text =
            retry_with_backoff(|| self.generator.generate(&request), &self.retry, "generate").await?;
        let answer = text.trim().to_string();
        debug!(state = "ANSWERED", answer_len = answer.len());
        info!(
            outcome = "generated",
            sources = ?documents.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            "answered question"
        );

        Ok(Answer {
            question: question.to_string(),
            answer,
            outcome: AnswerOutcome::Generated,
            documents,
            prompt: Some(request.prompt),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentMetadata;
    use crate::embedding::{EmbeddingEncoder, EmbeddingProvider};
    use crate::error::RagError;
    use crate::inmemory::InMemoryVectorStore;
    use crate::mock::{MockEmbeddingProvider, MockGenerator};
    use crate::vectorstore::VectorStore;

    async fn synthesizer(generator: Arc<MockGenerator>) -> AnswerSynthesizer {
        let provider = Arc::new(MockEmbeddingProvider::new(64));
        let encoder = EmbeddingEncoder::new(provider.clone());
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_or_replace("docs", provider.model()).await.unwrap();
        let vector = encoder.encode("Design campaigns favor modular products.").await.unwrap();
        store
            .add(
                "docs",
                &["a.txt".to_string()],
                &[vector],
                &["Design campaigns favor modular products.".to_string()],
                &[DocumentMetadata { title: "Design".to_string() }],
            )
            .await
            .unwrap();
        let engine = RetrievalEngine::new(encoder, store, "docs");
        AnswerSynthesizer::new(engine, generator)
            .with_retry(RetryPolicy::default().with_initial_delay(1).without_jitter())
    }

    #[tokio::test]
    async fn empty_question_on_empty_collection_gets_the_fallback() {
        let provider = Arc::new(MockEmbeddingProvider::new(64));
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_or_replace("docs", provider.model()).await.unwrap();
        let engine = RetrievalEngine::new(EmbeddingEncoder::new(provider), store, "docs");
        let generator = Arc::new(MockGenerator::new("unused"));

        let answer = AnswerSynthesizer::new(engine, generator.clone()).answer("", 3).await.unwrap();

        assert_eq!(answer.answer, FALLBACK_ANSWER);
        assert_eq!(answer.outcome, AnswerOutcome::NoContext);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn zero_top_k_is_rejected() {
        let generator = Arc::new(MockGenerator::new("unused"));
        let err = synthesizer(generator.clone()).await.answer("What matters?", 0).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn answer_is_trimmed_and_request_uses_configured_sampling() {
        let generator = Arc::new(MockGenerator::new("  Modular products. [Source: a.txt]\n"));
        let answer = synthesizer(generator.clone()).await.answer("What matters?", 1).await.unwrap();

        assert_eq!(answer.answer, "Modular products. [Source: a.txt]");
        assert_eq!(answer.outcome, AnswerOutcome::Generated);
        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].temperature, 0.0);
        assert_eq!(calls[0].max_output_tokens, 512);
        assert_eq!(answer.prompt.as_deref(), Some(calls[0].prompt.as_str()));
    }

    #[tokio::test]
    async fn retries_reuse_the_idempotency_key() {
        let generator = Arc::new(MockGenerator::new("ok").with_transient_failures(2));
        let answer = synthesizer(generator.clone()).await.answer("What matters?", 1).await.unwrap();

        assert_eq!(answer.answer, "ok");
        let calls = generator.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.idempotency_key == calls[0].idempotency_key));
    }

    #[tokio::test]
    async fn each_question_gets_a_fresh_idempotency_key() {
        let generator = Arc::new(MockGenerator::new("ok"));
        let synthesizer = synthesizer(generator.clone()).await;
        synthesizer.answer("first?", 1).await.unwrap();
        synthesizer.answer("second?", 1).await.unwrap();

        let calls = generator.calls();
        assert_ne!(calls[0].idempotency_key, calls[1].idempotency_key);
    }
}

//! # crowdintel-rag
//!
//! Retrieval-augmented question answering over a crowdfunding campaign
//! knowledge base.
//!
//! ## Overview
//!
//! A directory of plain-text campaign documents is embedded into a vector
//! collection once; each question is then embedded, matched against that
//! collection, and answered by a generation model that is only allowed to use
//! the retrieved text.
//!
//! - [`EmbeddingEncoder`] - flattens any provider's output to one vector per text
//! - [`VectorStore`] - collections, aliases and cosine nearest-neighbour search
//!   ([`InMemoryVectorStore`], [`FileVectorStore`])
//! - [`IngestionPipeline`] - generation-tagged rebuilds with rollback
//! - [`RetrievalEngine`] - top-k retrieval with embedding-model pinning
//! - [`ContextAssembler`] - bounded, attributable context blocks
//! - [`AnswerSynthesizer`] - grounded prompting with a fixed no-evidence fallback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crowdintel_rag::{
//!     AnswerSynthesizer, EmbeddingEncoder, FileVectorStore, IngestionPipeline, RagConfig,
//!     RetrievalEngine,
//! };
//! use crowdintel_rag::mock::{MockEmbeddingProvider, MockGenerator};
//!
//! let config = RagConfig::default();
//! let encoder = EmbeddingEncoder::new(Arc::new(MockEmbeddingProvider::default()));
//! let store = Arc::new(FileVectorStore::open(&config.index_dir).await?);
//!
//! IngestionPipeline::from_config(&config, encoder.clone(), store.clone()).rebuild().await?;
//!
//! let engine = RetrievalEngine::new(encoder, store, &config.collection);
//! let synthesizer = AnswerSynthesizer::from_config(&config, engine, Arc::new(MockGenerator::new("...")))?;
//! let answer = synthesizer.answer("What matters for design campaigns?", config.top_k).await?;
//! ```
//!
//! ## Features
//!
//! | Feature | Adds |
//! |---------|------|
//! | `gemini` | [`GeminiGenerator`](gemini::GeminiGenerator) |
//! | `huggingface` | [`HuggingFaceEmbeddingProvider`](huggingface::HuggingFaceEmbeddingProvider) |
//! | `openai` | [`OpenAIEmbeddingProvider`](openai::OpenAIEmbeddingProvider) |
//! | `full` | all of the above |

pub mod collection;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filestore;
pub mod generation;
pub mod ingest;
pub mod inmemory;
pub mod mock;
pub mod prompt;
pub mod retrieval;
pub mod retry;
pub mod synthesis;
pub mod vectorstore;

#[cfg(any(feature = "gemini", feature = "huggingface", feature = "openai"))]
mod http;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "huggingface")]
pub mod huggingface;
#[cfg(feature = "openai")]
pub mod openai;

pub use collection::CollectionInfo;
pub use config::{Credentials, RagConfig, RagConfigBuilder};
pub use context::{ContextAssembler, ContextBlock};
pub use document::{Document, DocumentMetadata, RetrievedDocument};
pub use embedding::{EmbeddingEncoder, EmbeddingProvider, RawEmbedding};
pub use error::{RagError, Result};
pub use filestore::FileVectorStore;
pub use generation::{GenerationRequest, TextGenerator};
pub use ingest::{IngestionPipeline, IngestionReport};
pub use inmemory::InMemoryVectorStore;
pub use prompt::{FALLBACK_ANSWER, PromptTemplate};
pub use retrieval::RetrievalEngine;
pub use retry::RetryPolicy;
pub use synthesis::{Answer, AnswerOutcome, AnswerSynthesizer};
pub use vectorstore::VectorStore;

#[cfg(feature = "gemini")]
pub use gemini::GeminiGenerator;
#[cfg(feature = "huggingface")]
pub use huggingface::HuggingFaceEmbeddingProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;

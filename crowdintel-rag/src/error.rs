//! Error types for the `crowdintel-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error, including a missing credential.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The corpus directory does not exist.
    #[error("Corpus directory not found: {}", path.display())]
    CorpusNotFound {
        /// The directory that was expected to hold the corpus.
        path: PathBuf,
    },

    /// An embedding backend returned a result that cannot be flattened to one vector.
    #[error("Embedding shape error: unexpected embedding shape {shape:?}: {message}")]
    EmbeddingShape {
        /// The shape of the raw embedding.
        shape: Vec<usize>,
        /// A description of the failure.
        message: String,
    },

    /// Parallel inputs had inconsistent lengths or vector dimensionalities.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A bulk insert contained a duplicate ID or collided with a stored one.
    #[error("Duplicate document id '{id}' in collection '{collection}'")]
    DuplicateId {
        /// The collection receiving the insert.
        collection: String,
        /// The offending ID.
        id: String,
    },

    /// A caller-supplied argument was rejected before any I/O took place.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An error in ingestion orchestration.
    #[error("Ingestion error: {0}")]
    IngestionError(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The named collection or alias does not exist.
    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),

    /// The query encoder does not match the model the collection was built with.
    #[error("Embedding model mismatch: collection indexed with '{indexed}', query encoded with '{query}'")]
    ModelMismatch {
        /// The model recorded at ingestion time.
        indexed: String,
        /// The model of the encoder used for the query.
        query: String,
    },

    /// A backend returned or persisted data that failed validation.
    #[error("Malformed response from {backend}: {message}")]
    MalformedResponse {
        /// The backend whose data was rejected.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation collaborator failed.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A transient network failure (timeout, connection, 429 or 5xx).
    #[error("Transport error ({provider}): {message}")]
    Transport {
        /// The backend the request was sent to.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the failed call may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Transport { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

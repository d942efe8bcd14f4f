//! Query-time retrieval.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::document::RetrievedDocument;
use crate::embedding::EmbeddingEncoder;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Encodes a query and returns its nearest documents from the collection
/// published under an alias.
///
/// The collection records which embedding model built it; a query encoded
/// with any other model is refused with [`RagError::ModelMismatch`] because
/// distances across models are meaningless.
#[derive(Clone)]
pub struct RetrievalEngine {
    encoder: EmbeddingEncoder,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl RetrievalEngine {
    /// Create an engine querying `collection` (an alias or a concrete name).
    pub fn new(
        encoder: EmbeddingEncoder,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self { encoder, store, collection: collection.into() }
    }

    /// The alias or collection name queried.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Up to `top_k` documents nearest to `query`, nearest first.
    ///
    /// An empty collection yields an empty result, which is not an error. If
    /// the resolved collection disappears before it is read (a concurrent
    /// rebuild pruned it), the alias is resolved once more and the query
    /// repeated against the new target.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if `top_k` is zero, before any
    /// I/O takes place.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>> {
        if top_k == 0 {
            return Err(RagError::InvalidArgument("top_k must be at least 1".to_string()));
        }

        let target = self.store.resolve(&self.collection).await?;
        match self.retrieve_from(&target, query, top_k).await {
            Err(RagError::CollectionNotFound(missing)) => {
                let current = self.store.resolve(&self.collection).await?;
                if current == target {
                    return Err(RagError::CollectionNotFound(missing));
                }
                warn!(
                    alias = %self.collection,
                    from = %target,
                    to = %current,
                    "collection replaced during retrieval, retrying"
                );
                self.retrieve_from(&current, query, top_k).await
            }
            other => other,
        }
    }

    async fn retrieve_from(
        &self,
        target: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let info = self.store.collection_info(target).await?;
        if info.embedding_model != self.encoder.model() {
            error!(
                collection = %target,
                indexed = %info.embedding_model,
                query = %self.encoder.model(),
                "embedding model mismatch"
            );
            return Err(RagError::ModelMismatch {
                indexed: info.embedding_model,
                query: self.encoder.model().to_string(),
            });
        }
        if info.document_count == 0 {
            debug!(collection = %target, "collection is empty");
            return Ok(Vec::new());
        }

        let vector = self.encoder.encode(query).await?;
        debug!(state = "EMBEDDED", dimensions = vector.len());
        let results = self.store.query(target, &vector, top_k).await?;
        debug!(
            collection = %target,
            top_k,
            result_count = results.len(),
            nearest = results.first().map(|d| d.id.as_str()),
            "retrieved documents"
        );
        Ok(results)
    }
}

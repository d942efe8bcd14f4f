//! Vector store trait for storing and searching document embeddings.

use async_trait::async_trait;

use crate::collection::CollectionInfo;
use crate::document::{DocumentMetadata, RetrievedDocument};
use crate::error::Result;

/// A storage backend for document vectors with nearest-neighbour search.
///
/// Implementations manage named collections of `(id, vector, text, metadata)`
/// entries plus an alias table. Queries are ranked by ascending cosine
/// distance.
///
/// # Example
///
/// ```rust,ignore
/// use crowdintel_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_or_replace("docs", "all-MiniLM-L6-v2").await?;
/// store.add("docs", &ids, &vectors, &texts, &metadata).await?;
/// let hits = store.query("docs", &query_vector, 3).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Delete any collection called `name` and create an empty one.
    ///
    /// A missing collection is not an error, so the call is idempotent.
    /// `embedding_model` is recorded so queries can detect a model change.
    async fn create_or_replace(&self, name: &str, embedding_model: &str) -> Result<()>;

    /// Delete a named collection and any alias pointing at it.
    ///
    /// A missing collection is not an error.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Bulk insert into an existing collection.
    ///
    /// All four slices must have equal length. IDs must be unique within the
    /// batch and must not collide with stored entries. The batch is validated
    /// in full before anything is written.
    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
        metadata: &[DocumentMetadata],
    ) -> Result<()>;

    /// Return up to `k` entries nearest to `vector`, nearest first.
    ///
    /// An empty collection yields an empty result; `k` larger than the
    /// collection truncates to its size.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedDocument>>;

    /// Describe a concrete collection.
    async fn collection_info(&self, name: &str) -> Result<CollectionInfo>;

    /// Describe every collection, sorted by name.
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// The IDs stored in a collection, in insertion order.
    async fn document_ids(&self, collection: &str) -> Result<Vec<String>>;

    /// Point `alias` at the existing collection `target`.
    ///
    /// Returns the previous target, if any. The swap is atomic with respect
    /// to [`resolve`](VectorStore::resolve).
    async fn set_alias(&self, alias: &str, target: &str) -> Result<Option<String>>;

    /// Resolve an alias to its target, or a collection name to itself.
    async fn resolve(&self, name: &str) -> Result<String>;
}

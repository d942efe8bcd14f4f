//! In-memory vector store using cosine distance.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! catalog protected by a `tokio::sync::RwLock`. It is suitable for tests and
//! short-lived processes; use [`FileVectorStore`](crate::FileVectorStore) for
//! an index that survives restarts.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::collection::{Catalog, Collection, CollectionInfo};
use crate::document::{DocumentMetadata, RetrievedDocument};
use crate::error::Result;
use crate::vectorstore::VectorStore;

/// An in-memory vector store.
///
/// # Example
///
/// ```rust,ignore
/// use crowdintel_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_or_replace("docs", "mock-embedding").await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    catalog: RwLock<Catalog>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_or_replace(&self, name: &str, embedding_model: &str) -> Result<()> {
        let collection = Collection::new(name, embedding_model)?;
        let mut catalog = self.catalog.write().await;
        catalog.collections.insert(name.to_string(), collection);
        debug!(collection = name, backend = "InMemory", "collection created");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.catalog.write().await.remove(name);
        Ok(())
    }

    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
        metadata: &[DocumentMetadata],
    ) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        catalog.get_mut(collection)?.insert(ids, vectors, texts, metadata)
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        self.catalog.read().await.get(collection)?.nearest(vector, k)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        Ok(self.catalog.read().await.get(name)?.info())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self.catalog.read().await.infos())
    }

    async fn document_ids(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self.catalog.read().await.get(collection)?.ids())
    }

    async fn set_alias(&self, alias: &str, target: &str) -> Result<Option<String>> {
        let mut catalog = self.catalog.write().await;
        catalog.check_alias(alias, target)?;
        Ok(catalog.aliases.insert(alias.to_string(), target.to_string()))
    }

    async fn resolve(&self, name: &str) -> Result<String> {
        self.catalog.read().await.resolve(name)
    }
}

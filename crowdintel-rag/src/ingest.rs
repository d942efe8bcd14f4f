//! Corpus ingestion with generation-tagged rebuilds.
//!
//! Every rebuild writes a fresh collection named `{alias}__gen_{n}` and only
//! then repoints the alias at it, so readers resolving through the alias see
//! either the old corpus or the new one, never a half-built collection. The
//! generation the alias pointed at before the swap is kept for
//! [`rollback`](IngestionPipeline::rollback); older ones are deleted.
//!
//! # Example
//!
//! ```rust,ignore
//! use crowdintel_rag::{EmbeddingEncoder, IngestionPipeline, FileVectorStore};
//!
//! let pipeline = IngestionPipeline::new(encoder, store, "docs", "crowdfunding_docs");
//! let report = pipeline.rebuild().await?;
//! println!("{} documents in {}", report.document_count, report.collection);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::collection::CollectionInfo;
use crate::config::RagConfig;
use crate::document::{Document, DocumentMetadata};
use crate::embedding::EmbeddingEncoder;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Separator between an alias and its generation number.
pub const GENERATION_SEPARATOR: &str = "__gen_";

/// Outcome of a successful [`IngestionPipeline::rebuild`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionReport {
    /// The concrete collection that was built.
    pub collection: String,
    /// The alias now pointing at it.
    pub alias: String,
    /// Number of documents stored.
    pub document_count: usize,
    /// Vector dimensionality, `None` for an empty corpus.
    pub dimensions: Option<usize>,
    /// The collection the alias pointed at before, kept for rollback.
    pub previous: Option<String>,
    /// Older generations deleted by this rebuild.
    pub pruned: Vec<String>,
}

/// Loads the corpus, encodes it and publishes it as a new collection
/// generation.
pub struct IngestionPipeline {
    encoder: EmbeddingEncoder,
    store: Arc<dyn VectorStore>,
    corpus_dir: PathBuf,
    alias: String,
}

impl IngestionPipeline {
    /// Create a pipeline reading `corpus_dir` and publishing under `alias`.
    pub fn new(
        encoder: EmbeddingEncoder,
        store: Arc<dyn VectorStore>,
        corpus_dir: impl Into<PathBuf>,
        alias: impl Into<String>,
    ) -> Self {
        Self { encoder, store, corpus_dir: corpus_dir.into(), alias: alias.into() }
    }

    /// Create a pipeline using the corpus directory and alias from `config`.
    pub fn from_config(
        config: &RagConfig,
        encoder: EmbeddingEncoder,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self::new(encoder, store, config.corpus_dir.clone(), config.collection.clone())
    }

    /// The alias this pipeline publishes under.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The corpus directory.
    pub fn corpus_dir(&self) -> &Path {
        &self.corpus_dir
    }

    /// Read every `*.txt` file directly inside the corpus directory, in file
    /// name order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CorpusNotFound`] if the directory does not exist and
    /// [`RagError::IngestionError`] if a file cannot be read as UTF-8 text.
    pub fn load_corpus(&self) -> Result<Vec<Document>> {
        if !self.corpus_dir.is_dir() {
            return Err(RagError::CorpusNotFound { path: self.corpus_dir.clone() });
        }

        let mut files = WalkDir::new(&self.corpus_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "txt"))
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>();
        files.sort();

        files
            .iter()
            .map(|path| {
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    error!(path = %path.display(), error = %e, "failed to read corpus file");
                    RagError::IngestionError(format!("failed to read '{}': {e}", path.display()))
                })?;
                let document = Document::from_file_contents(file_name, &contents);
                debug!(document.id = %document.id, chars = document.text.chars().count(), "loaded document");
                Ok(document)
            })
            .collect()
    }

    /// Rebuild the collection from the corpus and publish it under the alias.
    ///
    /// Nothing is written if loading or encoding fails. If storing fails, the
    /// half-built generation is deleted and the alias is left untouched. Once
    /// the alias has moved the rebuild counts as done; an old generation that
    /// cannot be deleted is logged and left out of [`IngestionReport::pruned`].
    pub async fn rebuild(&self) -> Result<IngestionReport> {
        let documents = self.load_corpus()?;
        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        // encode_batch guarantees one vector per text.
        let vectors = self.encoder.encode_batch(&texts).await.inspect_err(|e| {
            error!(alias = %self.alias, error = %e, "embedding failed during ingestion");
        })?;

        let generations = self.generation_numbers().await?;
        let next = generations.last().map_or(1, |(n, _)| n + 1);
        let collection = generation_name(&self.alias, next);

        let previous = match self.publish(&collection, &documents, &vectors).await {
            Ok(previous) => previous,
            Err(e) => {
                error!(collection = %collection, error = %e, "rebuild failed, discarding generation");
                if let Err(cleanup) = self.store.delete_collection(&collection).await {
                    warn!(collection = %collection, error = %cleanup, "failed to delete partial generation");
                }
                return Err(e);
            }
        };

        let mut pruned = Vec::new();
        for (_, name) in generations {
            if Some(&name) == previous.as_ref() {
                continue;
            }
            match self.store.delete_collection(&name).await {
                Ok(()) => {
                    debug!(collection = %name, "pruned old generation");
                    pruned.push(name);
                }
                Err(e) => {
                    warn!(collection = %name, error = %e, "failed to prune old generation");
                }
            }
        }

        let report = IngestionReport {
            collection,
            alias: self.alias.clone(),
            document_count: documents.len(),
            dimensions: vectors.first().map(Vec::len),
            previous,
            pruned,
        };
        info!(
            alias = %report.alias,
            collection = %report.collection,
            document_count = report.document_count,
            previous = ?report.previous,
            "rebuilt collection"
        );
        Ok(report)
    }

    async fn publish(
        &self,
        collection: &str,
        documents: &[Document],
        vectors: &[Vec<f32>],
    ) -> Result<Option<String>> {
        self.store.create_or_replace(collection, self.encoder.model()).await?;
        if !documents.is_empty() {
            let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
            let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
            let metadata: Vec<DocumentMetadata> = documents.iter().map(Document::metadata).collect();
            self.store.add(collection, &ids, vectors, &texts, &metadata).await?;
        }
        self.store.set_alias(&self.alias, collection).await
    }

    /// Point the alias back at the previous generation. See [`rollback`].
    pub async fn rollback(&self) -> Result<String> {
        rollback(self.store.as_ref(), &self.alias).await
    }

    /// Every stored generation of this alias. See [`generations`].
    pub async fn generations(&self) -> Result<Vec<CollectionInfo>> {
        generations(self.store.as_ref(), &self.alias).await
    }

    async fn generation_numbers(&self) -> Result<Vec<(u64, String)>> {
        Ok(numbered_generations(self.store.as_ref(), &self.alias)
            .await?
            .into_iter()
            .map(|(n, info)| (n, info.name))
            .collect())
    }
}

/// Point `alias` back at the newest generation older than the one it serves.
/// Returns the collection now served.
///
/// Needs only the store, so it works without an embedding backend.
///
/// # Errors
///
/// Returns [`RagError::IngestionError`] if there is no older generation.
pub async fn rollback(store: &dyn VectorStore, alias: &str) -> Result<String> {
    let current = store.resolve(alias).await?;
    let current_generation = parse_generation(alias, &current).ok_or_else(|| {
        RagError::IngestionError(format!(
            "alias '{alias}' points at '{current}', which is not a generation of it"
        ))
    })?;

    let target = numbered_generations(store, alias)
        .await?
        .into_iter()
        .rev()
        .find(|(n, _)| *n < current_generation)
        .map(|(_, info)| info.name)
        .ok_or_else(|| {
            RagError::IngestionError(format!("no generation older than '{current}' to roll back to"))
        })?;

    store.set_alias(alias, &target).await?;
    info!(alias, from = %current, to = %target, "rolled back collection");
    Ok(target)
}

/// Every stored generation of `alias`, oldest first.
pub async fn generations(store: &dyn VectorStore, alias: &str) -> Result<Vec<CollectionInfo>> {
    Ok(numbered_generations(store, alias).await?.into_iter().map(|(_, info)| info).collect())
}

async fn numbered_generations(
    store: &dyn VectorStore,
    alias: &str,
) -> Result<Vec<(u64, CollectionInfo)>> {
    let mut numbered: Vec<(u64, CollectionInfo)> = store
        .list_collections()
        .await?
        .into_iter()
        .filter_map(|info| parse_generation(alias, &info.name).map(|n| (n, info)))
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered)
}

fn generation_name(alias: &str, generation: u64) -> String {
    format!("{alias}{GENERATION_SEPARATOR}{generation}")
}

fn parse_generation(alias: &str, name: &str) -> Option<u64> {
    name.strip_prefix(alias)?.strip_prefix(GENERATION_SEPARATOR)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use async_trait::async_trait;

    use super::*;
    use crate::document::RetrievedDocument;
    use crate::inmemory::InMemoryVectorStore;
    use crate::mock::MockEmbeddingProvider;
    use crate::vectorstore::VectorStore;

    fn pipeline(dir: &Path, store: Arc<InMemoryVectorStore>) -> IngestionPipeline {
        let encoder = EmbeddingEncoder::new(Arc::new(MockEmbeddingProvider::new(32)));
        IngestionPipeline::new(encoder, store, dir, "docs")
    }

    #[test]
    fn generation_names_round_trip() {
        assert_eq!(generation_name("docs", 7), "docs__gen_7");
        assert_eq!(parse_generation("docs", "docs__gen_7"), Some(7));
        assert_eq!(parse_generation("docs", "docs_extra__gen_7"), None);
        assert_eq!(parse_generation("docs", "docs__gen_x"), None);
    }

    #[test]
    fn only_top_level_text_files_are_loaded_in_name_order() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("b.txt"), "Film\nbody").unwrap();
        fs::write(root.join("a.txt"), "  Design\nbody  ").unwrap();
        fs::write(root.join("notes.md"), "ignored").unwrap();
        fs::write(root.join("nested/c.txt"), "ignored").unwrap();

        let docs = pipeline(root, Arc::new(InMemoryVectorStore::new())).load_corpus().unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a.txt", "b.txt"]);
        assert_eq!(docs[0].title, "Design");
        assert_eq!(docs[0].text, "Design\nbody");
    }

    #[test]
    fn missing_corpus_directory_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("docs");
        let err = pipeline(&missing, Arc::new(InMemoryVectorStore::new())).load_corpus().unwrap_err();
        assert!(matches!(err, RagError::CorpusNotFound { ref path } if path == &missing));
    }

    #[tokio::test]
    async fn rebuild_keeps_previous_generation_and_prunes_older_ones() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "alpha").unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline(temp.path(), store.clone());

        let first = pipeline.rebuild().await.unwrap();
        assert_eq!(first.collection, "docs__gen_1");
        assert_eq!(first.previous, None);

        let second = pipeline.rebuild().await.unwrap();
        assert_eq!(second.previous.as_deref(), Some("docs__gen_1"));
        assert!(second.pruned.is_empty());

        let third = pipeline.rebuild().await.unwrap();
        assert_eq!(third.collection, "docs__gen_3");
        assert_eq!(third.pruned, ["docs__gen_1"]);
        assert_eq!(store.resolve("docs").await.unwrap(), "docs__gen_3");
    }

    #[tokio::test]
    async fn rollback_without_history_fails() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline(temp.path(), store);
        pipeline.rebuild().await.unwrap();
        assert!(matches!(pipeline.rollback().await, Err(RagError::IngestionError(_))));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_text_files_are_loaded() {
        let temp = tempfile::tempdir().unwrap();
        let outside = temp.path().join("shared");
        let corpus = temp.path().join("docs");
        fs::create_dir_all(&outside).unwrap();
        fs::create_dir_all(&corpus).unwrap();
        fs::write(outside.join("design.txt"), "Design campaigns").unwrap();
        std::os::unix::fs::symlink(outside.join("design.txt"), corpus.join("a.txt")).unwrap();

        let docs = pipeline(&corpus, Arc::new(InMemoryVectorStore::new())).load_corpus().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a.txt");
        assert_eq!(docs[0].text, "Design campaigns");
    }

    /// Accepts every write but refuses to delete anything.
    struct UndeletableStore(InMemoryVectorStore);

    #[async_trait]
    impl VectorStore for UndeletableStore {
        async fn create_or_replace(&self, name: &str, embedding_model: &str) -> Result<()> {
            self.0.create_or_replace(name, embedding_model).await
        }

        async fn delete_collection(&self, name: &str) -> Result<()> {
            Err(RagError::VectorStoreError {
                backend: "UndeletableStore".to_string(),
                message: format!("cannot delete '{name}': disk busy"),
            })
        }

        async fn add(
            &self,
            collection: &str,
            ids: &[String],
            vectors: &[Vec<f32>],
            texts: &[String],
            metadata: &[DocumentMetadata],
        ) -> Result<()> {
            self.0.add(collection, ids, vectors, texts, metadata).await
        }

        async fn query(
            &self,
            collection: &str,
            vector: &[f32],
            k: usize,
        ) -> Result<Vec<RetrievedDocument>> {
            self.0.query(collection, vector, k).await
        }

        async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
            self.0.collection_info(name).await
        }

        async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
            self.0.list_collections().await
        }

        async fn document_ids(&self, collection: &str) -> Result<Vec<String>> {
            self.0.document_ids(collection).await
        }

        async fn set_alias(&self, alias: &str, target: &str) -> Result<Option<String>> {
            self.0.set_alias(alias, target).await
        }

        async fn resolve(&self, name: &str) -> Result<String> {
            self.0.resolve(name).await
        }
    }

    #[tokio::test]
    async fn failed_prune_still_reports_the_published_generation() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "alpha").unwrap();
        let store = Arc::new(UndeletableStore(InMemoryVectorStore::new()));
        let encoder = EmbeddingEncoder::new(Arc::new(MockEmbeddingProvider::new(32)));
        let pipeline = IngestionPipeline::new(encoder, store.clone(), temp.path(), "docs");

        pipeline.rebuild().await.unwrap();
        pipeline.rebuild().await.unwrap();
        let third = pipeline.rebuild().await.unwrap();

        assert_eq!(third.collection, "docs__gen_3");
        assert_eq!(third.previous.as_deref(), Some("docs__gen_2"));
        assert!(third.pruned.is_empty());
        assert_eq!(store.resolve("docs").await.unwrap(), "docs__gen_3");
        assert_eq!(store.list_collections().await.unwrap().len(), 3);
    }
}

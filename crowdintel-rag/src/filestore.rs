//! On-disk vector store.
//!
//! [`FileVectorStore`] keeps the whole catalog in memory and mirrors every
//! mutation to a directory:
//!
//! ```text
//! <root>/aliases.json                 alias -> collection
//! <root>/collections/<name>.json      one file per collection
//! ```
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! crash leaves either the old or the new version of a file, never a torn
//! one. Everything read back from disk is validated before it is served.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::collection::{Catalog, Collection, CollectionInfo};
use crate::document::{DocumentMetadata, RetrievedDocument};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "FileVectorStore";
const ALIASES_FILE: &str = "aliases.json";
const COLLECTIONS_DIR: &str = "collections";
const TEMP_EXTENSION: &str = "tmp";

/// A [`VectorStore`] persisted as JSON files under a root directory.
///
/// # Example
///
/// ```rust,ignore
/// use crowdintel_rag::{FileVectorStore, VectorStore};
///
/// let store = FileVectorStore::open("chroma_store").await?;
/// let current = store.resolve("crowdfunding_docs").await?;
/// ```
#[derive(Debug)]
pub struct FileVectorStore {
    root: PathBuf,
    catalog: RwLock<Catalog>,
}

impl FileVectorStore {
    /// Open (or initialise) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::MalformedResponse`] if a persisted file cannot be
    /// parsed or violates a collection invariant, and [`RagError::Io`] for
    /// filesystem failures.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let collections_dir = root.join(COLLECTIONS_DIR);
        tokio::fs::create_dir_all(&collections_dir).await?;

        let mut catalog = Catalog::default();
        let mut entries = tokio::fs::read_dir(&collections_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(OsStr::to_str) {
                Some("json") => {}
                Some(TEMP_EXTENSION) => {
                    warn!(path = %path.display(), "removing interrupted write");
                    tokio::fs::remove_file(&path).await?;
                    continue;
                }
                _ => continue,
            }

            let collection: Collection = read_json(&path).await?;
            collection.validate().map_err(|message| malformed(&path, message))?;
            if path.file_stem() != Some(OsStr::new(&collection.name)) {
                return Err(malformed(
                    &path,
                    format!("file holds collection '{}'", collection.name),
                ));
            }
            catalog.collections.insert(collection.name.clone(), collection);
        }

        let aliases_path = root.join(ALIASES_FILE);
        if tokio::fs::try_exists(&aliases_path).await? {
            let aliases: BTreeMap<String, String> = read_json(&aliases_path).await?;
            if let Some((alias, target)) =
                aliases.iter().find(|(_, target)| !catalog.collections.contains_key(*target))
            {
                return Err(malformed(
                    &aliases_path,
                    format!("alias '{alias}' points to missing collection '{target}'"),
                ));
            }
            catalog.aliases = aliases;
        }

        info!(
            root = %root.display(),
            collections = catalog.collections.len(),
            aliases = catalog.aliases.len(),
            "opened file vector store"
        );
        Ok(Self { root, catalog: RwLock::new(catalog) })
    }

    /// The directory this store persists to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(COLLECTIONS_DIR).join(format!("{name}.json"))
    }

    async fn write_collection(&self, collection: &Collection) -> Result<()> {
        write_json_atomic(&self.collection_path(&collection.name), collection).await
    }

    async fn write_aliases(&self, aliases: &BTreeMap<String, String>) -> Result<()> {
        write_json_atomic(&self.root.join(ALIASES_FILE), aliases).await
    }
}

fn malformed(path: &Path, message: impl std::fmt::Display) -> RagError {
    RagError::MalformedResponse {
        backend: BACKEND.to_string(),
        message: format!("{}: {message}", path.display()),
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|e| malformed(path, e))
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    let temp = path.with_extension(format!("json.{TEMP_EXTENSION}"));
    tokio::fs::write(&temp, &bytes).await?;
    tokio::fs::rename(&temp, path).await?;
    Ok(())
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn create_or_replace(&self, name: &str, embedding_model: &str) -> Result<()> {
        let collection = Collection::new(name, embedding_model)?;
        let mut catalog = self.catalog.write().await;
        self.write_collection(&collection).await?;
        catalog.collections.insert(name.to_string(), collection);
        debug!(collection = name, backend = BACKEND, "collection created");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        if !catalog.collections.contains_key(name) {
            return Ok(());
        }

        match tokio::fs::remove_file(self.collection_path(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if catalog.remove(name) {
            self.write_aliases(&catalog.aliases).await?;
        }
        debug!(collection = name, backend = BACKEND, "collection deleted");
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
        let mut updated = catalog.get(collection)?.clone();
        updated.insert(ids, vectors, texts, metadata)?;
        self.write_collection(&updated).await?;
        catalog.collections.insert(collection.to_string(), updated);
        debug!(collection, backend = BACKEND, added = ids.len(), "documents added");
        Ok(())
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
        let mut aliases = catalog.aliases.clone();
        let previous = aliases.insert(alias.to_string(), target.to_string());
        self.write_aliases(&aliases).await?;
        catalog.aliases = aliases;
        debug!(alias, target, previous = ?previous, backend = BACKEND, "alias updated");
        Ok(previous)
    }

    async fn resolve(&self, name: &str) -> Result<String> {
        self.catalog.read().await.resolve(name)
    }
}

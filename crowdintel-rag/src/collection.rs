//! Collection state shared by the vector store backends.
//!
//! A [`Collection`] owns its records and enforces the insert invariants
//! (equal-length inputs, unique IDs, one dimensionality per collection). A
//! [`Catalog`] is the set of collections plus the alias table that maps stable
//! names onto concrete collections.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentMetadata, RetrievedDocument};
use crate::error::{RagError, Result};

/// Summary of a stored collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionInfo {
    /// The concrete collection name.
    pub name: String,
    /// The embedding model the collection was built with.
    pub embedding_model: String,
    /// Vector dimensionality, fixed by the first non-empty insert.
    pub dimensions: Option<usize>,
    /// Number of stored documents.
    pub document_count: usize,
    /// When the collection was created.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct StoredRecord {
    pub(crate) id: String,
    pub(crate) vector: Vec<f32>,
    pub(crate) text: String,
    pub(crate) metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct Collection {
    pub(crate) name: String,
    pub(crate) embedding_model: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) dimensions: Option<usize>,
    pub(crate) records: Vec<StoredRecord>,
}

/// Reject names that cannot double as file names.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RagError::InvalidArgument(format!(
            "invalid collection name '{name}': use ASCII letters, digits, '_', '-' or '.'"
        )))
    }
}

impl Collection {
    pub(crate) fn new(name: &str, embedding_model: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            embedding_model: embedding_model.to_string(),
            created_at: Utc::now(),
            dimensions: None,
            records: Vec::new(),
        })
    }

    pub(crate) fn info(&self) -> CollectionInfo {
        CollectionInfo {
            name: self.name.clone(),
            embedding_model: self.embedding_model.clone(),
            dimensions: self.dimensions,
            document_count: self.records.len(),
            created_at: self.created_at,
        }
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// Validate the whole batch, then append it. Nothing is inserted on error.
    pub(crate) fn insert(
        &mut self,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
        metadata: &[DocumentMetadata],
    ) -> Result<()> {
        if vectors.len() != ids.len() || texts.len() != ids.len() || metadata.len() != ids.len() {
            return Err(RagError::ShapeMismatch(format!(
                "add() needs equal lengths, got {} ids, {} vectors, {} texts, {} metadata",
                ids.len(),
                vectors.len(),
                texts.len(),
                metadata.len()
            )));
        }

        let mut seen: HashSet<&str> = self.records.iter().map(|r| r.id.as_str()).collect();
        for id in ids {
            if !seen.insert(id.as_str()) {
                return Err(RagError::DuplicateId { collection: self.name.clone(), id: id.clone() });
            }
        }

        let mut dimensions = self.dimensions;
        for (id, vector) in ids.iter().zip(vectors) {
            if vector.is_empty() {
                return Err(RagError::ShapeMismatch(format!("vector for '{id}' is empty")));
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(RagError::InvalidArgument(format!(
                    "vector for '{id}' contains non-finite values"
                )));
            }
            match dimensions {
                Some(expected) if expected != vector.len() => {
                    return Err(RagError::ShapeMismatch(format!(
                        "vector for '{id}' has {} dimensions, collection '{}' expects {expected}",
                        vector.len(),
                        self.name
                    )));
                }
                Some(_) => {}
                None => dimensions = Some(vector.len()),
            }
        }

        self.dimensions = dimensions;
        self.records.extend(ids.iter().zip(vectors).zip(texts).zip(metadata).map(
            |(((id, vector), text), metadata)| StoredRecord {
                id: id.clone(),
                vector: vector.clone(),
                text: text.clone(),
                metadata: metadata.clone(),
            },
        ));
        Ok(())
    }

    /// The `k` nearest records by ascending cosine distance, ties broken by ID.
    pub(crate) fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>> {
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimensions.filter(|&d| d != vector.len()) {
            return Err(RagError::ShapeMismatch(format!(
                "query vector has {} dimensions, collection '{}' expects {expected}",
                vector.len(),
                self.name
            )));
        }

        let mut scored: Vec<(f32, &StoredRecord)> =
            self.records.iter().map(|r| (cosine_distance(&r.vector, vector), r)).collect();
        scored.sort_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| a.id.cmp(&b.id)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, record)| RetrievedDocument {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                distance,
            })
            .collect())
    }

    /// Check invariants on data that came from outside the process.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        validate_name(&self.name).map_err(|e| e.to_string())?;
        let mut seen = HashSet::new();
        for record in &self.records {
            if !seen.insert(record.id.as_str()) {
                return Err(format!("duplicate id '{}'", record.id));
            }
            if Some(record.vector.len()) != self.dimensions {
                return Err(format!(
                    "record '{}' has {} dimensions, collection declares {:?}",
                    record.id,
                    record.vector.len(),
                    self.dimensions
                ));
            }
            if record.vector.iter().any(|v| !v.is_finite()) {
                return Err(format!("record '{}' contains non-finite values", record.id));
            }
        }
        Ok(())
    }
}

/// Cosine distance `1 - cos(a, b)`, clamped to `[0, 2]`.
///
/// Returns 1.0 if either vector has zero magnitude.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

/// Collections plus the alias table.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    pub(crate) collections: HashMap<String, Collection>,
    pub(crate) aliases: BTreeMap<String, String>,
}

impl Catalog {
    pub(crate) fn get(&self, name: &str) -> Result<&Collection> {
        self.collections.get(name).ok_or_else(|| RagError::CollectionNotFound(name.to_string()))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut Collection> {
        self.collections.get_mut(name).ok_or_else(|| RagError::CollectionNotFound(name.to_string()))
    }

    /// Aliases win over collections of the same name.
    pub(crate) fn resolve(&self, name: &str) -> Result<String> {
        if let Some(target) = self.aliases.get(name) {
            return Ok(target.clone());
        }
        if self.collections.contains_key(name) {
            return Ok(name.to_string());
        }
        Err(RagError::CollectionNotFound(name.to_string()))
    }

    pub(crate) fn check_alias(&self, alias: &str, target: &str) -> Result<()> {
        validate_name(alias)?;
        if alias == target {
            return Err(RagError::InvalidArgument(format!("alias '{alias}' cannot point to itself")));
        }
        self.get(target).map(|_| ())
    }

    /// Remove a collection and any alias pointing at it. Returns whether an
    /// alias was dropped.
    pub(crate) fn remove(&mut self, name: &str) -> bool {
        self.collections.remove(name);
        let before = self.aliases.len();
        self.aliases.retain(|_, target| target != name);
        before != self.aliases.len()
    }

    pub(crate) fn infos(&self) -> Vec<CollectionInfo> {
        let mut infos: Vec<CollectionInfo> = self.collections.values().map(Collection::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

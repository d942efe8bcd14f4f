//! Data types for corpus documents and retrieval results.

use serde::{Deserialize, Serialize};

/// A corpus document as loaded from one source text file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Unique identifier for the document (the source file name).
    pub id: String,
    /// The first non-empty line of the text, or the file name for empty files.
    pub title: String,
    /// The whitespace-trimmed text content of the document.
    pub text: String,
}

impl Document {
    /// Build a document from a file name and its raw contents.
    ///
    /// The text is trimmed; the title is the first non-empty line, falling
    /// back to `file_name` when the trimmed text is empty.
    pub fn from_file_contents(file_name: impl Into<String>, contents: &str) -> Self {
        let id = file_name.into();
        let text = contents.trim().to_string();
        let title = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| id.clone());
        Self { id, title, text }
    }

    /// The metadata stored alongside this document's vector.
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata { title: self.title.clone() }
    }
}

/// Metadata persisted with each stored document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// The document title.
    pub title: String,
}

/// A stored document returned by a nearest-neighbour query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    /// The document ID.
    pub id: String,
    /// The full stored text.
    pub text: String,
    /// The stored metadata.
    pub metadata: DocumentMetadata,
    /// Cosine distance to the query vector (lower is more similar).
    pub distance: f32,
}

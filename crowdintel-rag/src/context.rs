//! Context window assembly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::RetrievedDocument;
use crate::error::{RagError, Result};

/// Default per-document character budget.
pub const DEFAULT_MAX_CHARS_PER_DOC: usize = 4000;

/// Separator placed between document blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Attributable text handed to the prompt template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBlock(String);

impl ContextBlock {
    /// The rendered text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether no documents contributed to the block.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns ranked retrieval results into a bounded [`ContextBlock`].
///
/// Each document becomes a block:
///
/// ```text
/// [Source: {id}] {title}
/// {text, truncated to max_chars_per_doc characters}
/// ```
///
/// Blocks keep retrieval rank order and are joined with [`BLOCK_SEPARATOR`].
/// Truncation counts Unicode scalar values, so it may cut a word but never a
/// character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAssembler {
    max_chars_per_doc: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self { max_chars_per_doc: DEFAULT_MAX_CHARS_PER_DOC }
    }
}

impl ContextAssembler {
    /// Create an assembler with a custom per-document budget.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if `max_chars_per_doc` is zero.
    pub fn new(max_chars_per_doc: usize) -> Result<Self> {
        if max_chars_per_doc == 0 {
            return Err(RagError::InvalidArgument(
                "max_chars_per_doc must be greater than zero".to_string(),
            ));
        }
        Ok(Self { max_chars_per_doc })
    }

    /// The per-document character budget.
    pub fn max_chars_per_doc(&self) -> usize {
        self.max_chars_per_doc
    }

    /// Render `retrieved` in the order given.
    pub fn assemble(&self, retrieved: &[RetrievedDocument]) -> ContextBlock {
        let blocks: Vec<String> = retrieved
            .iter()
            .map(|doc| {
                format!(
                    "[Source: {}] {}\n{}",
                    doc.id,
                    doc.metadata.title,
                    truncate_chars(&doc.text, self.max_chars_per_doc)
                )
            })
            .collect();
        ContextBlock(blocks.join(BLOCK_SEPARATOR))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentMetadata;

    fn doc(id: &str, title: &str, text: &str, distance: f32) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            text: text.to_string(),
            metadata: DocumentMetadata { title: title.to_string() },
            distance,
        }
    }

    #[test]
    fn long_documents_are_cut_to_exactly_the_budget() {
        let text = "x".repeat(4500);
        let block = ContextAssembler::default().assemble(&[doc("long.txt", "Long", &text, 0.1)]);

        let header = "[Source: long.txt] Long\n";
        assert!(block.as_str().starts_with(header));
        assert_eq!(block.as_str().len() - header.len(), 4000);
    }

    #[test]
    fn truncation_never_splits_a_character() {
        let text = "é".repeat(10);
        let block = ContextAssembler::new(3).unwrap().assemble(&[doc("a.txt", "T", &text, 0.0)]);
        assert_eq!(block.as_str(), "[Source: a.txt] T\nééé");
    }

    #[test]
    fn blocks_keep_rank_order_and_separator() {
        let docs = [doc("b.txt", "Second", "bbb", 0.5), doc("a.txt", "First", "aaa", 0.1)];
        let block = ContextAssembler::default().assemble(&docs);
        assert_eq!(
            block.as_str(),
            "[Source: b.txt] Second\nbbb\n\n---\n\n[Source: a.txt] First\naaa"
        );
    }

    #[test]
    fn no_documents_yield_an_empty_block() {
        assert!(ContextAssembler::default().assemble(&[]).is_empty());
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(matches!(ContextAssembler::new(0), Err(RagError::InvalidArgument(_))));
    }
}

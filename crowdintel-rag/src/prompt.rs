//! Grounded prompt rendering.
//!
//! Rendering is a pure function of the template, the context block and the
//! question, so prompts can be inspected and tested without a generator.

use crate::context::ContextBlock;
use crate::error::{RagError, Result};

/// The exact sentence returned when the context cannot support an answer.
pub const FALLBACK_ANSWER: &str =
    "I don't have enough information in the provided context to answer that.";

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

const DEFAULT_TEMPLATE: &str = "\
You are an evidence-based assistant. Use ONLY the provided CONTEXT documents below to answer the user's question.
If the answer cannot be found or inferred from the context, say exactly: \"I don't have enough information in the provided context to answer that.\"

CONTEXT:
{context}

USER QUESTION:
{question}

INSTRUCTIONS:
- Answer concisely (2-6 sentences) using facts from the context.
- Cite sources by appending [Source: <id>] after factual statements.
- If info is missing, say exactly: \"I don't have enough information in the provided context to answer that.\"
- Do not hallucinate or invent facts.

Answer:
";

/// A prompt template with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string() }
    }
}

impl PromptTemplate {
    /// Create a template, checking that both placeholders are present.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] naming the missing placeholder.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(RagError::ConfigError(format!(
                    "prompt template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute the placeholders in a single pass.
    ///
    /// Placeholder-like text inside the context or question is copied
    /// verbatim, never expanded.
    pub fn render(&self, context: &ContextBlock, question: &str) -> String {
        let mut out = String::with_capacity(
            self.template.len() + context.as_str().len() + question.len(),
        );
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                out.push_str(context.as_str());
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

//! Document text extraction and grounding context
//!
//! The uploaded PDF is reduced to plain text once, then shared read-only
//! into both the voice session and the chat client. Each consumer embeds a
//! bounded prefix of the text as conversational grounding.

use lopdf::Document;
use std::sync::Arc;

use crate::error::ExtractError;

/// Extracted document text. Immutable; clones share the same backing string.
#[derive(Debug, Clone)]
pub struct Knowledge {
    text: Arc<str>,
}

impl Knowledge {
    /// Wrap already-extracted text.
    pub fn from_text(text: impl Into<String>) -> Result<Self, ExtractError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ExtractError::NoText);
        }
        Ok(Self { text: text.into() })
    }

    /// Extract text from a PDF payload: page texts in page order, joined
    /// with newlines.
    pub fn from_pdf_bytes(data: &[u8]) -> Result<Self, ExtractError> {
        let doc = Document::load_mem(data).map_err(|e| ExtractError::Parse(e.to_string()))?;

        let page_map = doc.get_pages();
        let mut pages = Vec::new();
        for (&page_number, _) in page_map.iter() {
            match doc.extract_text(&[page_number]) {
                Ok(text) => pages.push(text.trim_end().to_string()),
                Err(e) => {
                    tracing::warn!(page = page_number, "failed to extract page text: {}", e);
                    pages.push(String::new());
                }
            }
        }

        Self::from_text(pages.join("\n"))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// The first `max_chars` characters, cut on a character boundary.
    pub fn grounding_prefix(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((byte_index, _)) => &self.text[..byte_index],
            None => &self.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_rejected() {
        assert!(matches!(
            Knowledge::from_text("   \n\t "),
            Err(ExtractError::NoText)
        ));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let result = Knowledge::from_pdf_bytes(b"this is not a pdf");
        assert!(matches!(result, Err(ExtractError::Parse(_))));
    }

    #[test]
    fn test_grounding_prefix_bounds() {
        let knowledge = Knowledge::from_text("abcdef").unwrap();
        assert_eq!(knowledge.grounding_prefix(3), "abc");
        assert_eq!(knowledge.grounding_prefix(100), "abcdef");
    }

    #[test]
    fn test_grounding_prefix_respects_char_boundaries() {
        let knowledge = Knowledge::from_text("héllo wörld").unwrap();
        // Counted in characters, not bytes
        assert_eq!(knowledge.grounding_prefix(2), "hé");
        assert_eq!(knowledge.grounding_prefix(8), "héllo wö");
    }
}

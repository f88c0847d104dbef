//! Context assembly: turn retrieved passages into a labeled context string
//! for generation prompts.

use crate::types::Passage;

/// Format passages as labeled context blocks:
///
/// ```text
/// doc_1 (page page_4): a queue is a first in first out structure...
///
/// doc_2 (page page_7): ...
/// ```
///
/// Snippets are whitespace-flattened so each block stays on one line; the
/// `doc_{i}` labels are what stage responses cite in their `sources`.
pub fn format_context(passages: &[Passage]) -> String {
    let blocks: Vec<String> = passages
        .iter()
        .enumerate()
        .map(|(i, passage)| {
            let snippet = passage.text.trim().replace('\n', " ");
            format!("doc_{} (page {}): {}...", i + 1, passage.source_locator, snippet)
        })
        .collect();
    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_context_labels_and_separators() {
        let passages = vec![
            Passage::new("a queue is FIFO", "4", 0.9),
            Passage::new("a stack is LIFO", "7", 0.8),
        ];
        let context = format_context(&passages);
        assert_eq!(
            context,
            "doc_1 (page 4): a queue is FIFO...\n\ndoc_2 (page 7): a stack is LIFO..."
        );
    }

    #[test]
    fn test_format_context_flattens_newlines() {
        let passages = vec![Passage::new("line one\nline two", "2", 0.5)];
        assert_eq!(format_context(&passages), "doc_1 (page 2): line one line two...");
    }

    #[test]
    fn test_format_context_empty() {
        assert_eq!(format_context(&[]), "");
    }
}

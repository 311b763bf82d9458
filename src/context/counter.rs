//! Token estimation
//! 
//! Budgets in this crate are approximate: a character heuristic is enough to
//! keep prompts inside a provider's window without shipping a tokenizer.
//! 
//! # Algorithm
//! 
//! ```text
//! estimate(text) = ⌈chars(text) / 4⌉
//! ```

use crate::types::{Message, SearchResult};

/// Characters per estimated token
const CHARS_PER_TOKEN: usize = 4;

/// Heuristic token counter
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter;

impl TokenCounter {
    pub fn new() -> Self {
        Self
    }

    /// Estimate token count for text
    /// 
    /// Uses ceiling division so short non-empty strings never count as zero.
    /// 
    /// ```
    /// # use ragscope::context::counter::TokenCounter;
    /// let counter = TokenCounter::new();
    /// assert_eq!(counter.estimate(&"a".repeat(100)), 25);
    /// assert_eq!(counter.estimate("a"), 1);
    /// ```
    pub fn estimate(&self, text: &str) -> usize {
        let char_count = text.chars().count();
        (char_count + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN
    }

    /// Sum of estimates over message contents
    pub fn estimate_messages<'a, I>(&self, messages: I) -> usize
    where
        I: IntoIterator<Item = &'a Message>,
    {
        messages.into_iter().map(|m| self.estimate(m.content())).sum()
    }

    /// Sum of estimates over document contents
    pub fn estimate_documents(&self, documents: &[SearchResult]) -> usize {
        documents.iter().map(|d| self.estimate(&d.content)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_estimation() {
        let counter = TokenCounter::new();
        assert_eq!(counter.estimate(&"a".repeat(100)), 25);
    }

    #[test]
    fn test_empty_string() {
        let counter = TokenCounter::new();
        assert_eq!(counter.estimate(""), 0);
    }

    #[test]
    fn test_ceiling_division() {
        let counter = TokenCounter::new();
        assert_eq!(counter.estimate("a"), 1);
        assert_eq!(counter.estimate("abcde"), 2);
    }

    #[test]
    fn test_unicode_characters() {
        let counter = TokenCounter::new();
        // 3 chars, not 9 bytes
        assert_eq!(counter.estimate("日本語"), 1);
    }

    #[test]
    fn test_message_batch() {
        let counter = TokenCounter::new();
        let messages = vec![
            Message::user("a".repeat(40)),
            Message::assistant("b".repeat(40)),
        ];
        assert_eq!(counter.estimate_messages(&messages), 20);
    }

    #[test]
    fn test_document_batch() {
        let counter = TokenCounter::new();
        let docs = vec![
            SearchResult::new("1", "x".repeat(8), 0.9, "vector"),
            SearchResult::new("2", "y".repeat(9), 0.8, "vector"),
        ];
        assert_eq!(counter.estimate_documents(&docs), 5);
    }
}

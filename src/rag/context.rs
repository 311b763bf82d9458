// Prompt assembly for grounded generation
use crate::types::{Message, SearchResult};
use serde::{Deserialize, Serialize};

/// Messages ready for the generation tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// System prompt, retained history, then the grounded question
    pub messages: Vec<Message>,

    /// Doc ids placed in the prompt, in rank order
    pub citations: Vec<String>,
}

/// Builds generation prompts from conversation context and documents
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Assemble the prompt
    ///
    /// `conversation` is the output of `get_context_for_generation()`: the
    /// system prompt first, then retained history. Documents and the current
    /// query go into one final user message.
    pub fn build(&self, conversation: Vec<Message>, documents: &[SearchResult], query: &str) -> Prompt {
        let mut messages = conversation;
        messages.push(Message::user(self.grounded_question(documents, query)));

        Prompt {
            messages,
            citations: documents.iter().map(|d| d.doc_id.clone()).collect(),
        }
    }

    fn grounded_question(&self, documents: &[SearchResult], query: &str) -> String {
        if documents.is_empty() {
            return format!(
                "No relevant documents were found.\n\nQuestion: {}",
                query
            );
        }

        let formatted: Vec<String> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| self.format_document(i + 1, doc))
            .collect();

        format!(
            "Context documents ({}):\n\n{}\n\nQuestion: {}",
            documents.len(),
            formatted.join("\n\n"),
            query
        )
    }

    fn format_document(&self, number: usize, doc: &SearchResult) -> String {
        format!(
            "[{}] {} (score: {:.3})\n{}",
            number, doc.doc_id, doc.score, doc.content
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_prompt_layout() {
        let conversation = vec![
            Message::system("sys"),
            Message::user("earlier question"),
            Message::assistant("earlier answer"),
        ];
        let docs = vec![
            SearchResult::new("d1", "first", 0.9, "vector"),
            SearchResult::new("d2", "second", 0.4, "semantic"),
        ];

        let prompt = PromptBuilder::new().build(conversation, &docs, "What now?");

        assert_eq!(prompt.messages.len(), 4);
        assert_eq!(prompt.messages[0].role(), Role::System);
        let last = prompt.messages.last().unwrap();
        assert_eq!(last.role(), Role::User);
        assert!(last.content().contains("[1] d1 (score: 0.900)"));
        assert!(last.content().contains("[2] d2"));
        assert!(last.content().ends_with("Question: What now?"));
        assert_eq!(prompt.citations, vec!["d1".to_string(), "d2".to_string()]);
    }

    #[test]
    fn test_prompt_without_documents() {
        let prompt = PromptBuilder::new().build(vec![Message::system("sys")], &[], "q");
        assert!(prompt.citations.is_empty());
        assert!(prompt.messages[1].content().starts_with("No relevant documents"));
    }
}

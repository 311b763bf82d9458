//! Conversation history with budget-driven trimming
//!
//! Holds one session's messages in a deque:
//! - System prompt stored apart from history, never evicted
//! - Appends at the tail, evicts from the head
//! - After every append: cost(history) ≤ budget

use crate::context::counter::TokenCounter;
use crate::types::{Message, Role};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Default token budget for retained history
pub const DEFAULT_TOKEN_BUDGET: usize = 2000;

/// Budget applied to non-system history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "limit", rename_all = "snake_case")]
pub enum HistoryBudget {
    /// Estimated tokens across retained message contents
    Tokens(usize),

    /// Number of retained messages
    Messages(usize),
}

impl Default for HistoryBudget {
    fn default() -> Self {
        HistoryBudget::Tokens(DEFAULT_TOKEN_BUDGET)
    }
}

impl HistoryBudget {
    pub fn limit(&self) -> usize {
        match self {
            HistoryBudget::Tokens(n) | HistoryBudget::Messages(n) => *n,
        }
    }
}

/// Per-session message history
#[derive(Debug, Clone)]
pub struct ConversationContext {
    id: Uuid,
    system_prompt: Message,
    history: VecDeque<Message>,
    budget: HistoryBudget,
    counter: TokenCounter,
}

impl ConversationContext {
    /// Start a conversation with the default token budget
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self::with_budget(system_prompt, HistoryBudget::default())
    }

    pub fn with_budget(system_prompt: impl Into<String>, budget: HistoryBudget) -> Self {
        Self {
            id: Uuid::new_v4(),
            system_prompt: Message::system(system_prompt),
            history: VecDeque::new(),
            budget,
            counter: TokenCounter::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn budget(&self) -> HistoryBudget {
        self.budget
    }

    pub fn system_prompt(&self) -> &Message {
        &self.system_prompt
    }

    /// Append a user message and trim
    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    /// Append an assistant message and trim
    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    fn push(&mut self, message: Message) {
        debug_assert_ne!(message.role(), Role::System);
        self.history.push_back(message);
        self.trim();
    }

    /// Evict from the head until the retained history fits the budget
    ///
    /// # Complexity
    /// O(n) per call in the number of evicted messages, plus one O(n)
    /// recount of the retained history.
    fn trim(&mut self) {
        let mut cost = self.retained_cost();
        while cost > self.budget.limit() {
            match self.history.pop_front() {
                Some(evicted) => cost -= self.cost_of(&evicted),
                None => break,
            }
        }
    }

    fn cost_of(&self, message: &Message) -> usize {
        match self.budget {
            HistoryBudget::Tokens(_) => self.counter.estimate(message.content()),
            HistoryBudget::Messages(_) => 1,
        }
    }

    /// Cost of retained non-system messages in the budget's unit
    pub fn retained_cost(&self) -> usize {
        self.history.iter().map(|m| self.cost_of(m)).sum()
    }

    /// Estimated tokens of retained non-system messages
    pub fn estimated_tokens(&self) -> usize {
        self.counter.estimate_messages(self.history.iter())
    }

    /// Retained non-system messages, oldest first
    pub fn history(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop all history; the system prompt stays
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// System prompt followed by retained history, ready for prompt assembly
    pub fn get_context_for_generation(&self) -> Vec<Message> {
        std::iter::once(self.system_prompt.clone())
            .chain(self.history.iter().cloned())
            .collect()
    }
}

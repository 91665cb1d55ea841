//! Multi-turn conversation management
//!
//! Provides a `Conversation` type holding the system framing, retrieved
//! context and prior chat turns sent to a text-generation provider.
//! Supports serialization to OpenAI and Anthropic API formats and token
//! estimation for prompt budgeting.

use serde::{Deserialize, Serialize};

/// Marker prefix identifying the retrieved-context system message
const CONTEXT_MARKER: &str = "[RETRIEVED_CONTEXT]";

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Estimate token count for this message using the ~4 chars/token heuristic.
    pub fn estimate_tokens(&self) -> usize {
        // ~4 characters per token, plus overhead for message framing
        (self.content.len() / 4).max(1) + 4
    }
}

/// An ordered sequence of conversation messages with serialization helpers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Create a conversation with a system message.
    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ConversationMessage::system(system_prompt)],
        }
    }

    pub fn push(&mut self, message: ConversationMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Estimate total token count across all messages.
    pub fn estimate_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.estimate_tokens()).sum()
    }

    /// First message with the System role.
    pub fn system_message(&self) -> Option<&ConversationMessage> {
        self.messages.iter().find(|m| m.role == MessageRole::System)
    }

    /// The retrieved-context block, without its marker.
    pub fn retrieved_context(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System && m.content.starts_with(CONTEXT_MARKER))
            .map(|m| m.content[CONTEXT_MARKER.len()..].trim_start())
    }

    /// The most recent user message.
    pub fn last_user_message(&self) -> Option<&ConversationMessage> {
        self.messages.iter().rev().find(|m| m.role == MessageRole::User)
    }

    /// Serialize to OpenAI chat completions format.
    pub fn to_openai_messages(&self) -> Vec<serde_json::Value> {
        self.messages
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": msg.role.as_str(),
                    "content": msg.content,
                })
            })
            .collect()
    }

    /// Serialize to Anthropic Messages API format.
    ///
    /// Returns `(system_prompt, messages)` because Anthropic takes the system
    /// prompt as a separate top-level field. Multiple system messages are
    /// joined with blank lines.
    pub fn to_anthropic_messages(&self) -> (Option<String>, Vec<serde_json::Value>) {
        let system_parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

        let messages = self
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|msg| {
                serde_json::json!({
                    "role": msg.role.as_str(),
                    "content": msg.content,
                })
            })
            .collect();

        (system, messages)
    }

    /// Truncate the conversation to fit within a token budget.
    ///
    /// Preserves every system message and the most recent other messages.
    pub fn truncate_to_budget(&mut self, max_tokens: usize) {
        if self.estimate_tokens() <= max_tokens {
            return;
        }

        let (system, rest): (Vec<_>, Vec<_>) = self
            .messages
            .drain(..)
            .partition(|m| m.role == MessageRole::System);

        let system_tokens: usize = system.iter().map(|m| m.estimate_tokens()).sum();
        let remaining_budget = max_tokens.saturating_sub(system_tokens);

        let mut kept = Vec::new();
        let mut used_tokens = 0;
        for msg in rest.into_iter().rev() {
            let msg_tokens = msg.estimate_tokens();
            if used_tokens + msg_tokens > remaining_budget {
                break;
            }
            used_tokens += msg_tokens;
            kept.push(msg);
        }
        kept.reverse();

        self.messages = system;
        self.messages.extend(kept);
    }

    /// Insert the retrieved context after the initial system message,
    /// replacing any earlier context block.
    pub fn inject_retrieved_context(&mut self, context: impl Into<String>) {
        let content = format!("{}\n{}", CONTEXT_MARKER, context.into());
        let msg = ConversationMessage::system(content);

        if let Some(pos) = self
            .messages
            .iter()
            .position(|m| m.role == MessageRole::System && m.content.starts_with(CONTEXT_MARKER))
        {
            self.messages[pos] = msg;
        } else {
            let insert_pos = if self
                .messages
                .first()
                .is_some_and(|m| m.role == MessageRole::System)
            {
                1
            } else {
                0
            };
            self.messages.insert(insert_pos, msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_creation() {
        let conv = Conversation::with_system("You are the campus assistant.");
        assert_eq!(conv.len(), 1);
        assert!(!conv.is_empty());
        assert!(conv.system_message().is_some());
    }

    #[test]
    fn test_openai_serialization() {
        let mut conv = Conversation::with_system("Answer from context.");
        conv.push(ConversationMessage::user("What is the leave policy?"));
        conv.push(ConversationMessage::assistant("Up to ten days."));

        let msgs = conv.to_openai_messages();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["role"], "user");
        assert_eq!(msgs[2]["content"], "Up to ten days.");
    }

    #[test]
    fn test_anthropic_serialization_joins_system_messages() {
        let mut conv = Conversation::with_system("System prompt here.");
        conv.inject_retrieved_context("[semantic: policies/leave.md] Sick leave.");
        conv.push(ConversationMessage::user("Hello"));

        let (system, messages) = conv.to_anthropic_messages();
        let system = system.unwrap();
        assert!(system.starts_with("System prompt here."));
        assert!(system.contains("Sick leave."));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn test_token_estimation() {
        let msg = ConversationMessage::user("Hello, world!"); // 13 chars
        // 13/4 = 3, max(3,1) + 4 = 7
        assert_eq!(msg.estimate_tokens(), 7);
    }

    #[test]
    fn test_truncate_to_budget_keeps_system_and_recent() {
        let mut conv = Conversation::with_system("sys");
        conv.inject_retrieved_context("context");
        for i in 0..20 {
            conv.push(ConversationMessage::user(format!(
                "Message number {} with some extra text to take up tokens",
                i
            )));
            conv.push(ConversationMessage::assistant(format!("Reply {}", i)));
        }

        let original_len = conv.len();
        conv.truncate_to_budget(100);
        assert!(conv.len() < original_len);
        assert_eq!(conv.messages()[0].role, MessageRole::System);
        assert!(conv.retrieved_context().is_some());
        assert_eq!(conv.messages().last().unwrap().content, "Reply 19");
        assert!(conv.estimate_tokens() <= 100);
    }

    #[test]
    fn test_inject_retrieved_context_replaces_existing() {
        let mut conv = Conversation::with_system("System prompt");
        conv.push(ConversationMessage::user("hello"));
        conv.inject_retrieved_context("First");
        conv.inject_retrieved_context("Updated");

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[0].content, "System prompt");
        assert_eq!(conv.retrieved_context(), Some("Updated"));
        assert_eq!(conv.messages()[2].role, MessageRole::User);
    }

    #[test]
    fn test_inject_retrieved_context_without_system() {
        let mut conv = Conversation::new();
        conv.push(ConversationMessage::user("hello"));
        conv.inject_retrieved_context("Knowledge");
        assert_eq!(conv.retrieved_context(), Some("Knowledge"));
        assert_eq!(conv.last_user_message().unwrap().content, "hello");
    }
}

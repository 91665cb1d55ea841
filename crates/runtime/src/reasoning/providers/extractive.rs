//! Extractive inference provider
//!
//! Offline stand-in for a hosted model. It answers by quoting the highest
//! ranked lines of the retrieved context, so the assistant stays usable
//! without an API key.

use crate::reasoning::conversation::Conversation;
use crate::reasoning::inference::*;
use async_trait::async_trait;

const NO_CONTEXT_REPLY: &str =
    "I could not find anything in the portal's knowledge base or records about that.";

/// Quotes the top context lines back to the user.
pub struct ExtractiveInferenceProvider {
    max_lines: usize,
}

impl ExtractiveInferenceProvider {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
        }
    }
}

impl Default for ExtractiveInferenceProvider {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl InferenceProvider for ExtractiveInferenceProvider {
    async fn complete(
        &self,
        conversation: &Conversation,
        _options: &InferenceOptions,
    ) -> Result<InferenceResponse, InferenceError> {
        let lines: Vec<&str> = conversation
            .retrieved_context()
            .map(|context| {
                context
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .take(self.max_lines)
                    .collect()
            })
            .unwrap_or_default();

        let content = if lines.is_empty() {
            NO_CONTEXT_REPLY.to_string()
        } else {
            let mut reply = String::from("Here is what I found:");
            for line in &lines {
                reply.push_str("\n- ");
                reply.push_str(line);
            }
            reply
        };

        let prompt_tokens = conversation.estimate_tokens() as u32;
        let completion_tokens = (content.len() / 4).max(1) as u32;
        Ok(InferenceResponse {
            content,
            finish_reason: FinishReason::Stop,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            model: self.default_model().to_string(),
        })
    }

    fn provider_name(&self) -> &str {
        "extractive"
    }

    fn default_model(&self) -> &str {
        "extractive-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::conversation::ConversationMessage;

    #[tokio::test]
    async fn test_quotes_top_context_lines() {
        let mut conv = Conversation::with_system("sys");
        conv.inject_retrieved_context(
            "[semantic: a.md] one\n[structured: students/search] two\n\n\
             [semantic: b.md] three\nfour",
        );
        conv.push(ConversationMessage::user("q"));

        let provider = ExtractiveInferenceProvider::new(2);
        let resp = provider
            .complete(&conv, &InferenceOptions::default())
            .await
            .unwrap();
        assert_eq!(
            resp.content,
            "Here is what I found:\n- [semantic: a.md] one\n- [structured: students/search] two"
        );
        assert_eq!(resp.model, "extractive-v1");
    }

    #[tokio::test]
    async fn test_without_context() {
        let conv = Conversation::with_system("sys");
        let resp = ExtractiveInferenceProvider::default()
            .complete(&conv, &InferenceOptions::default())
            .await
            .unwrap();
        assert_eq!(resp.content, NO_CONTEXT_REPLY);
    }
}

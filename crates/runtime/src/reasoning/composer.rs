//! Response composer
//!
//! Turns a context bundle and recent history into the final reply: builds the
//! prompt, calls the inference provider under a hard timeout, and labels the
//! result with a confidence level, sources and follow-up suggestions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::config::GenerationConfig;
use crate::reasoning::conversation::{Conversation, ConversationMessage};
use crate::reasoning::inference::{InferenceError, InferenceOptions, InferenceProvider};
use crate::retrieval::{ContextBundle, PathStatus, Provenance, RetrievalError};
use crate::routing::ClassificationDecision;
use crate::session::{Turn, TurnRole};
use crate::text::content_terms;

const SYSTEM_PROMPT: &str = "You are the academic portal assistant. Answer the student's or \
staff member's question using only the retrieved context below. Each context line starts \
with a source tag such as [semantic: policies/leave.md] or [structured: students/search]; \
cite those tags when you use a line. If the context does not contain the answer, say so \
plainly and suggest where to look.";

const MAX_SUGGESTIONS: usize = 3;

/// Token budget for the assembled prompt
const PROMPT_TOKEN_BUDGET: usize = 6000;

/// Number of items quoted in a fallback reply
const FALLBACK_ITEMS: usize = 3;

/// Coarse quality label attached to every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// What happened to the text-generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationStatus {
    Completed { provider: String, model: String },
    TimedOut { after_ms: u64 },
    Failed { kind: String, reason: String },
    /// Retrieval produced nothing usable, so generation was not attempted
    Skipped,
}

impl GenerationStatus {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, GenerationStatus::Completed { .. })
    }

    /// Error kind for a fallback reply
    pub fn error_kind(&self) -> Option<&str> {
        match self {
            GenerationStatus::TimedOut { .. } => Some("GenerationTimeout"),
            GenerationStatus::Failed { kind, .. } => Some(kind.as_str()),
            _ => None,
        }
    }
}

/// The packaged reply handed back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedReply {
    pub text: String,
    pub confidence: Confidence,
    pub sources: Vec<Provenance>,
    pub suggestions: Vec<String>,
    pub generation: GenerationStatus,
}

pub struct ResponseComposer {
    provider: Arc<dyn InferenceProvider>,
    config: GenerationConfig,
}

impl ResponseComposer {
    pub fn new(provider: Arc<dyn InferenceProvider>, config: GenerationConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Compose a reply. Never fails: timeouts and provider errors become a
    /// low-confidence fallback that still quotes the retrieved context.
    pub async fn compose(
        &self,
        decision: &ClassificationDecision,
        bundle: &ContextBundle,
        history: &[Turn],
    ) -> ComposedReply {
        let conversation = self.build_conversation(bundle, history);
        let options = InferenceOptions {
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            model: None,
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.timeout,
            self.provider.complete(&conversation, &options),
        )
        .await;

        let (text, generation) = match outcome {
            Ok(Ok(response)) if !response.content.trim().is_empty() => {
                tracing::debug!(
                    provider = self.provider.provider_name(),
                    model = %response.model,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Generated reply"
                );
                (
                    response.content.trim().to_string(),
                    GenerationStatus::Completed {
                        provider: self.provider.provider_name().to_string(),
                        model: response.model,
                    },
                )
            }
            Ok(Ok(_)) => {
                tracing::warn!("Text generation returned an empty reply");
                (
                    fallback_text(bundle, "The answer service returned an empty reply."),
                    GenerationStatus::Failed {
                        kind: "GenerationUnavailable".to_string(),
                        reason: "empty response".to_string(),
                    },
                )
            }
            Ok(Err(InferenceError::Timeout { elapsed })) => {
                tracing::warn!(?elapsed, "Text generation timed out");
                (
                    fallback_text(bundle, "The answer service took too long to respond."),
                    GenerationStatus::TimedOut {
                        after_ms: elapsed.as_millis() as u64,
                    },
                )
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Text generation failed");
                (
                    fallback_text(bundle, "The answer service is unavailable right now."),
                    GenerationStatus::Failed {
                        kind: e.kind().to_string(),
                        reason: e.to_string(),
                    },
                )
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Text generation timed out"
                );
                (
                    fallback_text(bundle, "The answer service took too long to respond."),
                    GenerationStatus::TimedOut {
                        after_ms: self.config.timeout.as_millis() as u64,
                    },
                )
            }
        };

        let confidence = if generation.is_fallback() {
            Confidence::Low
        } else {
            self.confidence(bundle)
        };

        ComposedReply {
            text,
            confidence,
            sources: bundle.sources(),
            suggestions: suggestions(decision, Some(bundle)),
            generation,
        }
    }

    /// Reply used when no retrieval path produced anything usable.
    pub fn unavailable(
        &self,
        decision: &ClassificationDecision,
        error: &RetrievalError,
    ) -> ComposedReply {
        tracing::warn!(error = %error, "Replying without retrieved context");
        ComposedReply {
            text: "I couldn't reach the knowledge base or the portal records just now, so I \
                   can't answer reliably. Please try again in a moment."
                .to_string(),
            confidence: Confidence::Low,
            sources: Vec::new(),
            suggestions: suggestions(decision, None),
            generation: GenerationStatus::Skipped,
        }
    }

    /// High when something clears the strong threshold on a complete
    /// retrieval, low when nothing came back or a path failed.
    pub fn confidence(&self, bundle: &ContextBundle) -> Confidence {
        if bundle.is_empty() || bundle.partial {
            return Confidence::Low;
        }
        match bundle.max_relevance() {
            Some(best) if best >= self.config.strong_relevance_threshold => Confidence::High,
            _ => Confidence::Medium,
        }
    }

    /// System framing, provenance-tagged context, then the last
    /// `history_window` turns. The query is appended unless it is already
    /// the final user turn of `history`.
    pub fn build_conversation(&self, bundle: &ContextBundle, history: &[Turn]) -> Conversation {
        let mut conversation = Conversation::with_system(SYSTEM_PROMPT);

        if !bundle.is_empty() {
            let context = bundle
                .items
                .iter()
                .map(|item| item.render())
                .collect::<Vec<_>>()
                .join("\n");
            conversation.inject_retrieved_context(context);
        }

        let start = history.len().saturating_sub(self.config.history_window);
        for turn in &history[start..] {
            conversation.push(match turn.role {
                TurnRole::User => ConversationMessage::user(&turn.content),
                TurnRole::Assistant => ConversationMessage::assistant(&turn.content),
            });
        }

        let query_recorded = history
            .last()
            .is_some_and(|turn| turn.role == TurnRole::User && turn.content == bundle.query);
        if !query_recorded {
            conversation.push(ConversationMessage::user(&bundle.query));
        }

        conversation.truncate_to_budget(PROMPT_TOKEN_BUDGET);
        conversation
    }
}

fn fallback_text(bundle: &ContextBundle, lead: &str) -> String {
    if bundle.is_empty() {
        return format!("{lead} I also found nothing relevant for this question.");
    }
    let mut text = format!("{lead} Here is the most relevant information I found:");
    for item in bundle.items.iter().take(FALLBACK_ITEMS) {
        text.push_str("\n- ");
        text.push_str(&item.render());
    }
    text
}

fn collection_phrase(collection: &str) -> String {
    collection.replace('_', " ")
}

/// Follow-up queries for the parts of the classification that came back
/// empty or failed.
fn suggestions(decision: &ClassificationDecision, bundle: Option<&ContextBundle>) -> Vec<String> {
    let terms = content_terms(&decision.query).join(" ");
    let mut out: Vec<String> = Vec::new();

    let unmet = |status: Option<&PathStatus>| match status {
        None => true,
        Some(PathStatus::Failed { .. } | PathStatus::Degraded { .. }) => true,
        Some(PathStatus::Succeeded { hits }) => *hits == 0,
        Some(PathStatus::NotRequested) => false,
    };

    if decision.route.wants_structured() && unmet(bundle.map(|b| &b.structured)) {
        if decision.target_collections.is_empty() {
            if !terms.is_empty() {
                out.push(format!("List records matching \"{terms}\""));
            }
        } else {
            for collection in &decision.target_collections {
                out.push(format!("Show me all {}", collection_phrase(collection)));
            }
        }
    }

    if decision.route.wants_semantic() && unmet(bundle.map(|b| &b.semantic)) && !terms.is_empty()
    {
        out.push(format!("What is the policy on {terms}?"));
    }

    out.dedup();
    out.truncate(MAX_SUGGESTIONS);
    out
}

//! End-to-end tests for the chat flow.
//!
//! Uses a vocabulary embedder that can be switched off, an in-memory record
//! store and the extractive provider, so every test runs offline and
//! deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;

use campus_runtime::config::{Config, StorageBackend, StorageConfig};
use campus_runtime::rag::{EmbeddingService, IndexError};
use campus_runtime::reasoning::conversation::Conversation;
use campus_runtime::reasoning::inference::*;
use campus_runtime::reasoning::{ExtractiveInferenceProvider, GenerationStatus};
use campus_runtime::retrieval::Origin;
use campus_runtime::tools::{CreateArgs, InMemoryRecordStore, Record};
use campus_runtime::{CampusAssistant, ChatRequest, Confidence, QueryRoute};

// ---------------------------------------------------------------------------
// Mock embedder
// ---------------------------------------------------------------------------

const VOCABULARY: &[&str] = &[
    "leave",
    "sick",
    "days",
    "policy",
    "attendance",
    "percent",
    "certificate",
    "exam",
];

/// One dimension per vocabulary word plus a constant bias dimension.
struct VocabularyEmbedder {
    down: AtomicBool,
}

impl VocabularyEmbedder {
    fn new() -> Self {
        Self {
            down: AtomicBool::new(false),
        }
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(IndexError::EmbeddingUnavailable {
                reason: "connection refused".to_string(),
            });
        }
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect();
        vector.push(0.1);
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingService for VocabularyEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        self.embed(text)
    }

    async fn generate_batch_embeddings(
        &self,
        texts: Vec<&str>,
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        texts.into_iter().map(|text| self.embed(text)).collect()
    }

    fn embedding_dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }
}

// ---------------------------------------------------------------------------
// Mock provider
// ---------------------------------------------------------------------------

/// Never answers within any reasonable timeout.
struct StalledProvider;

#[async_trait]
impl InferenceProvider for StalledProvider {
    async fn complete(
        &self,
        _conversation: &Conversation,
        _options: &InferenceOptions,
    ) -> Result<InferenceResponse, InferenceError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(InferenceResponse {
            content: "too late".to_string(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            model: "stalled".to_string(),
        })
    }

    fn provider_name(&self) -> &str {
        "stalled"
    }

    fn default_model(&self) -> &str {
        "stalled"
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn record(collection: &str, id: &str, fields: Value) -> Record {
    let now = Utc::now();
    Record {
        id: id.to_string(),
        collection: collection.to_string(),
        fields: fields.as_object().cloned().unwrap_or_default(),
        created_at: now,
        updated_at: now,
    }
}

fn records() -> Vec<Record> {
    vec![
        record(
            "students",
            "s-1",
            json!({"name": "Asha Rao", "roll_number": "CS001", "department": "CSE",
                   "year": 2, "attendance_percentage": 71, "status": "active"}),
        ),
        record(
            "students",
            "s-2",
            json!({"name": "Ben Okafor", "roll_number": "ME014", "department": "MECH",
                   "year": 3, "attendance_percentage": 92, "status": "active"}),
        ),
        record(
            "leave_requests",
            "l-1",
            json!({"student_id": "s-1", "leave_type": "medical", "start_date": "2024-03-04",
                   "end_date": "2024-03-06", "reason": "fever", "status": "pending", "days": 3}),
        ),
        record(
            "leave_requests",
            "l-2",
            json!({"student_id": "s-2", "leave_type": "personal", "start_date": "2024-02-10",
                   "end_date": "2024-02-11", "reason": "family event", "status": "approved",
                   "days": 2}),
        ),
    ]
}

fn knowledge_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("leave_policy.md"),
        "# Leave Policy\n\nStudents may take up to ten sick leave days per semester.\n\
         Sick leave longer than two days needs a medical certificate.\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("attendance_policy.md"),
        "# Attendance Policy\n\nEvery student must keep attendance above 75 percent.\n\
         Students below the attendance threshold cannot sit the final exam.\n",
    )
    .unwrap();
    dir
}

fn config() -> Config {
    Config {
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            ..Default::default()
        },
        ..Default::default()
    }
}

struct Harness {
    assistant: CampusAssistant,
    embedder: Arc<VocabularyEmbedder>,
    knowledge: TempDir,
}

async fn harness_with(config: Config, provider: Arc<dyn InferenceProvider>) -> Harness {
    let embedder = Arc::new(VocabularyEmbedder::new());
    let assistant = CampusAssistant::with_components(
        config,
        embedder.clone(),
        Arc::new(InMemoryRecordStore::with_records(records())),
        provider,
    )
    .unwrap();

    let knowledge = knowledge_dir();
    let chunks = assistant.rebuild_index(Some(knowledge.path())).await.unwrap();
    assert!(chunks >= 2);

    Harness {
        assistant,
        embedder,
        knowledge,
    }
}

async fn harness() -> Harness {
    harness_with(config(), Arc::new(ExtractiveInferenceProvider::default())).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_routes_the_documented_queries() {
    let h = harness().await;

    let decision = h.assistant.classify("What is the leave policy for sick days?");
    assert_eq!(decision.route, QueryRoute::Semantic);

    let decision = h.assistant.classify("Show me all pending leave requests");
    assert_eq!(decision.route, QueryRoute::Structured);
    assert_eq!(decision.target_collections, vec!["leave_requests".to_string()]);

    let decision = h
        .assistant
        .classify("Explain the attendance policy and show me students below 75%");
    assert_eq!(decision.route, QueryRoute::Combined);
}

#[tokio::test]
async fn test_semantic_question_cites_policy_document() {
    let h = harness().await;
    let reply = h
        .assistant
        .chat(ChatRequest::new("What is the leave policy for sick days?"))
        .await
        .unwrap();

    assert_eq!(reply.route, QueryRoute::Semantic);
    assert!(!reply.partial);
    assert!(reply
        .sources
        .iter()
        .any(|source| source.origin == Origin::Semantic && source.source == "leave_policy.md"));
    assert!(reply.response.to_lowercase().contains("sick"));
}

#[tokio::test]
async fn test_structured_question_finds_matching_records() {
    let h = harness().await;
    let reply = h
        .assistant
        .chat(ChatRequest::new("Show me all pending leave requests"))
        .await
        .unwrap();

    assert_eq!(reply.route, QueryRoute::Structured);
    assert_eq!(reply.structured.hits(), 1);
    assert!(reply.sources.iter().all(|s| s.origin == Origin::Structured));
    assert!(reply.response.contains("pending"));
    assert_eq!(reply.confidence, Confidence::High);
}

#[tokio::test]
async fn test_combined_bundle_keeps_both_origins() {
    let mut config = config();
    config.retrieval.max_bundle_items = 2;
    let h = harness_with(config, Arc::new(ExtractiveInferenceProvider::default())).await;

    let reply = h
        .assistant
        .chat(ChatRequest::new(
            "Explain the leave policy and show me pending leave requests",
        ))
        .await
        .unwrap();

    assert_eq!(reply.route, QueryRoute::Combined);
    assert_eq!(reply.sources.len(), 2);
    assert!(reply.sources.iter().any(|s| s.origin == Origin::Semantic));
    assert!(reply.sources.iter().any(|s| s.origin == Origin::Structured));
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_structured_results() {
    let h = harness().await;
    h.embedder.set_down(true);

    let reply = h
        .assistant
        .chat(ChatRequest::new(
            "Explain the leave policy and show me pending leave requests",
        ))
        .await
        .unwrap();

    assert!(reply.partial);
    assert!(reply.semantic.failed());
    assert_eq!(reply.structured.hits(), 1);
    assert_ne!(reply.confidence, Confidence::High);
    assert!(reply.response.contains("pending"));
    assert!(reply.sources.iter().all(|s| s.origin == Origin::Structured));
}

#[tokio::test]
async fn test_all_paths_down_still_replies() {
    let h = harness().await;
    h.embedder.set_down(true);

    let reply = h
        .assistant
        .chat(ChatRequest::new("What is the leave policy for sick days?"))
        .await
        .unwrap();

    assert_eq!(reply.confidence, Confidence::Low);
    assert_eq!(reply.generation, GenerationStatus::Skipped);
    assert!(reply.sources.is_empty());
    assert!(reply.semantic.failed());
    // The exchange is still recorded
    assert_eq!(reply.turn_count, 2);
}

#[tokio::test]
async fn test_generation_timeout_falls_back_to_context() {
    let mut config = config();
    config.generation.timeout = Duration::from_millis(50);
    let h = harness_with(config, Arc::new(StalledProvider)).await;

    let reply = h
        .assistant
        .chat(ChatRequest::new("Show me all pending leave requests"))
        .await
        .unwrap();

    assert!(matches!(reply.generation, GenerationStatus::TimedOut { .. }));
    assert_eq!(reply.confidence, Confidence::Low);
    assert!(reply.response.contains("pending"));
}

#[tokio::test]
async fn test_session_history_follows_the_conversation() {
    let h = harness().await;
    let first = h
        .assistant
        .chat(ChatRequest::new("What is the leave policy for sick days?").in_session("web-42"))
        .await
        .unwrap();
    let second = h
        .assistant
        .chat(ChatRequest::new("Show me all pending leave requests").in_session("web-42"))
        .await
        .unwrap();

    assert_eq!(first.session_id, "web-42");
    assert_eq!(second.turn_count, 4);

    let history = h.assistant.history("web-42").await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].content, "What is the leave policy for sick days?");
    assert_eq!(history[3].content, second.response);

    // Sessions are independent
    assert!(h.assistant.history("web-43").await.unwrap().is_empty());

    // Nothing is idle yet
    assert_eq!(h.assistant.cleanup_sessions(), 0);

    assert_eq!(h.assistant.clear_session("web-42").await.unwrap(), 4);
    assert!(h.assistant.history("web-42").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_messages_in_one_session_are_not_lost() {
    let h = Arc::new(harness().await);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move {
                let message = format!("Show me all pending leave requests {i}");
                h.assistant
                    .chat(ChatRequest::new(message).in_session("busy"))
                    .await
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(h.assistant.history("busy").await.unwrap().len(), 16);
}

#[tokio::test]
async fn test_create_reports_missing_required_fields() {
    let h = harness().await;
    let err = h
        .assistant
        .create(CreateArgs {
            collection: "students".to_string(),
            fields: json!({"name": "New Student"}).as_object().cloned().unwrap(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "ValidationError");
    let details = err.details().unwrap();
    let fields: Vec<&str> = details["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(fields.contains(&"roll_number"));
    assert!(fields.contains(&"department"));
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_index() {
    let h = harness().await;
    let before = h.assistant.document_count();

    h.embedder.set_down(true);
    let err = h
        .assistant
        .rebuild_index(Some(h.knowledge.path()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "IndexBuildError");
    assert_eq!(h.assistant.document_count(), before);
}

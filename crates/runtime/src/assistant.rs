//! Campus assistant façade
//!
//! Wires classifier, orchestrator, composer and session store into the
//! per-message chat flow, and exposes index maintenance and the structured
//! tools to the HTTP API and CLI.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::config::{Config, StorageBackend};
use crate::rag::{
    create_embedding_service_from_env, EmbeddingIndex, EmbeddingService, IndexStats,
};
use crate::reasoning::{
    inference_provider_from_env, ComposedReply, Confidence, GenerationStatus, InferenceProvider,
    ResponseComposer,
};
use crate::retrieval::{PathStatus, Provenance, RetrievalError, RetrievalOrchestrator};
use crate::routing::{ClassificationDecision, QueryClassifier, QueryRoute};
use crate::session::{
    generate_session_id, validate_session_id, ExportFormat, SessionStore, Turn, TurnRole,
};
use crate::tools::{
    AggregateArgs, AggregateResult, CollectionRegistry, CreateArgs, EditArgs, FetchArgs,
    InMemoryRecordStore, JsonFileRecordStore, Record, RecordStore, ScoredRecord, SearchArgs,
    StructuredToolSet, ToolCall, ToolOutput,
};
use crate::types::{AssistantError, AssistantResult};

/// Longest accepted chat message, in characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Reply to one chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub response: String,
    pub confidence: Confidence,
    pub suggestions: Vec<String>,
    pub sources: Vec<Provenance>,
    pub route: QueryRoute,
    pub semantic: PathStatus,
    pub structured: PathStatus,
    /// A requested retrieval path failed
    pub partial: bool,
    pub generation: GenerationStatus,
    pub turn_count: usize,
    pub session_active: bool,
}

pub struct CampusAssistant {
    config: Config,
    classifier: QueryClassifier,
    index: Arc<EmbeddingIndex>,
    tools: StructuredToolSet,
    orchestrator: RetrievalOrchestrator,
    composer: ResponseComposer,
    sessions: SessionStore,
}

impl CampusAssistant {
    /// Build from configuration, detecting embedding and LLM providers from
    /// the environment.
    pub fn from_config(config: Config) -> AssistantResult<Self> {
        config.validate()?;
        let embedder = create_embedding_service_from_env(config.index.embedding_dimension)?;
        let store: Arc<dyn RecordStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryRecordStore::new()),
            StorageBackend::JsonFiles => {
                Arc::new(JsonFileRecordStore::open(config.storage.data_dir.clone())?)
            }
        };
        let provider = inference_provider_from_env();
        Self::with_components(config, embedder, store, provider)
    }

    /// Build from explicit collaborators.
    pub fn with_components(
        config: Config,
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn InferenceProvider>,
    ) -> AssistantResult<Self> {
        config.validate()?;
        let registry = Arc::new(CollectionRegistry::default());
        let classifier = QueryClassifier::new(&config.classification, &registry)?;
        let index = Arc::new(EmbeddingIndex::new(embedder));
        let tools = StructuredToolSet::new(store, registry);
        let orchestrator =
            RetrievalOrchestrator::new(index.clone(), tools.clone(), config.retrieval.clone());
        let composer = ResponseComposer::new(provider, config.generation.clone());
        let sessions = SessionStore::from_config(&config.session);

        tracing::info!(
            generation = composer.provider_name(),
            storage = ?config.storage.backend,
            "Campus assistant initialised"
        );

        Ok(Self {
            config,
            classifier,
            index,
            tools,
            orchestrator,
            composer,
            sessions,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn classify(&self, query: &str) -> ClassificationDecision {
        self.classifier.classify(query)
    }

    /// Handle one user message end to end.
    ///
    /// Only malformed requests fail; retrieval and generation problems are
    /// reported through the reply's confidence and status fields.
    pub async fn chat(&self, request: ChatRequest) -> AssistantResult<ChatReply> {
        let message = request.message.trim().to_string();
        if message.is_empty() {
            return Err(AssistantError::invalid_request("message must not be empty"));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AssistantError::invalid_request(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }
        let session_id = match request.session_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                validate_session_id(&id)?;
                id
            }
            None => generate_session_id(),
        };

        let span = tracing::info_span!(
            "chat_turn",
            session_id = %session_id,
            user_id = request.user_id.as_deref().unwrap_or("anonymous"),
        );
        self.chat_turn(session_id, message).instrument(span).await
    }

    async fn chat_turn(&self, session_id: String, message: String) -> AssistantResult<ChatReply> {
        let history = self.sessions.get_history(&session_id).await?;
        self.sessions
            .append_turn(&session_id, TurnRole::User, message.as_str())
            .await?;

        let decision = self.classifier.classify(&message);
        let (reply, semantic, structured, partial) =
            match self.orchestrator.retrieve(&decision).await {
                Ok(bundle) => {
                    let reply = self.composer.compose(&decision, &bundle, &history).await;
                    (reply, bundle.semantic, bundle.structured, bundle.partial)
                }
                Err(error) => {
                    let reply = self.composer.unavailable(&decision, &error);
                    let (semantic, structured) = failed_statuses(&error);
                    (reply, semantic, structured, true)
                }
            };

        let ComposedReply {
            text,
            confidence,
            sources,
            suggestions,
            generation,
        } = reply;

        let turn_count = self
            .sessions
            .append_turn(&session_id, TurnRole::Assistant, text.as_str())
            .await?;
        let session_active = self
            .sessions
            .is_active(&session_id, self.config.session.inactivity_threshold)
            .await;

        tracing::info!(
            route = %decision.route,
            %confidence,
            sources = sources.len(),
            partial,
            "Chat turn answered"
        );

        Ok(ChatReply {
            session_id,
            response: text,
            confidence,
            suggestions,
            sources,
            route: decision.route,
            semantic,
            structured,
            partial,
            generation,
            turn_count,
            session_active,
        })
    }

    pub async fn history(&self, session_id: &str) -> AssistantResult<Vec<Turn>> {
        Ok(self.sessions.get_history(session_id).await?)
    }

    pub async fn clear_session(&self, session_id: &str) -> AssistantResult<usize> {
        Ok(self.sessions.clear(session_id).await?)
    }

    pub async fn export_session(
        &self,
        session_id: &str,
        format: ExportFormat,
    ) -> AssistantResult<String> {
        Ok(self.sessions.export(session_id, format).await?)
    }

    /// Sweep sessions idle past the configured threshold
    pub fn cleanup_sessions(&self) -> usize {
        self.sessions.cleanup(self.config.session.inactivity_threshold)
    }

    pub fn cleanup_sessions_older_than(&self, threshold: Duration) -> usize {
        self.sessions.cleanup(threshold)
    }

    /// Rebuild the index from `source`, or the configured knowledge path.
    pub async fn rebuild_index(&self, source: Option<&Path>) -> AssistantResult<usize> {
        let source = source.unwrap_or(self.config.index.knowledge_path.as_path());
        let count = self
            .index
            .rebuild_index(
                source,
                self.config.index.chunk_size,
                self.config.index.chunk_overlap,
            )
            .await?;
        Ok(count)
    }

    /// Rebuild from the configured knowledge path if it exists. Failures
    /// are logged and leave the index empty.
    pub async fn seed_index(&self) -> Option<usize> {
        let path = &self.config.index.knowledge_path;
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Knowledge path missing, index left empty");
            return None;
        }
        match self.rebuild_index(None).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(error = %e, "Initial index build failed");
                None
            }
        }
    }

    pub fn index_stats(&self) -> IndexStats {
        self.index.stats()
    }

    pub fn document_count(&self) -> usize {
        self.index.document_count()
    }

    pub fn collections(&self) -> Vec<String> {
        self.tools.registry().names()
    }

    pub async fn execute_tool(&self, call: ToolCall) -> AssistantResult<ToolOutput> {
        Ok(self.tools.execute(call).await?)
    }

    pub async fn search(&self, args: SearchArgs) -> AssistantResult<Vec<ScoredRecord>> {
        Ok(self.tools.search(args).await?)
    }

    pub async fn aggregate(&self, args: AggregateArgs) -> AssistantResult<AggregateResult> {
        Ok(self.tools.aggregate(args).await?)
    }

    pub async fn fetch_by_id(&self, args: FetchArgs) -> AssistantResult<Record> {
        Ok(self.tools.fetch_by_id(args).await?)
    }

    pub async fn edit(&self, args: EditArgs) -> AssistantResult<Record> {
        Ok(self.tools.edit(args).await?)
    }

    pub async fn create(&self, args: CreateArgs) -> AssistantResult<Record> {
        Ok(self.tools.create(args).await?)
    }
}

fn failed_statuses(error: &RetrievalError) -> (PathStatus, PathStatus) {
    let RetrievalError::Unavailable {
        semantic,
        structured,
    } = error;
    let status = |reason: &Option<String>| match reason {
        Some(reason) => PathStatus::Failed {
            reason: reason.clone(),
        },
        None => PathStatus::NotRequested,
    };
    (status(semantic), status(structured))
}

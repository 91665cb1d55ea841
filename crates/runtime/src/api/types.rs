//! HTTP API specific data structures
//!
//! Request and response bodies for the chat, session, index and tool
//! endpoints, plus their conversions from the assistant's domain types.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use utoipa::{IntoParams, ToSchema};

use crate::assistant::{ChatReply, ChatRequest};
use crate::rag::IndexStats;
use crate::reasoning::GenerationStatus;
use crate::retrieval::{PathStatus, Provenance};
use crate::session::Turn;
use crate::tools::{AggregateArgs, CreateArgs, EditArgs, FetchArgs, SearchArgs};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall system status
    pub status: String,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    /// Chunks currently in the embedding index
    pub indexed_chunks: usize,
    /// Sessions currently held in memory
    pub sessions: usize,
}

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Stable error kind, e.g. `ValidationError`
    pub error_kind: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequestBody {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl From<ChatRequestBody> for ChatRequest {
    fn from(body: ChatRequestBody) -> Self {
        ChatRequest {
            message: body.message,
            session_id: body.session_id,
            user_id: body.user_id,
        }
    }
}

/// Citation for one context item used in a reply
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SourceEntry {
    /// `semantic` or `structured`
    pub origin: String,
    /// Knowledge source path or collection name
    pub source: String,
    pub tool: Option<String>,
    pub title: String,
}

impl From<Provenance> for SourceEntry {
    fn from(provenance: Provenance) -> Self {
        Self {
            origin: provenance.origin.to_string(),
            source: provenance.source,
            tool: provenance.tool,
            title: provenance.title,
        }
    }
}

/// Outcome of one retrieval path
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PathStatusEntry {
    /// `not_requested`, `succeeded`, `degraded` or `failed`
    pub status: String,
    pub hits: usize,
    pub reason: Option<String>,
}

impl From<PathStatus> for PathStatusEntry {
    fn from(status: PathStatus) -> Self {
        match status {
            PathStatus::NotRequested => Self {
                status: "not_requested".into(),
                hits: 0,
                reason: None,
            },
            PathStatus::Succeeded { hits } => Self {
                status: "succeeded".into(),
                hits,
                reason: None,
            },
            PathStatus::Degraded { hits, failures } => Self {
                status: "degraded".into(),
                hits,
                reason: Some(failures.join("; ")),
            },
            PathStatus::Failed { reason } => Self {
                status: "failed".into(),
                hits: 0,
                reason: Some(reason),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RetrievalStatus {
    pub semantic: PathStatusEntry,
    pub structured: PathStatusEntry,
    /// One requested path failed
    pub partial: bool,
    /// `completed`, `timed_out`, `failed` or `skipped`
    pub generation: String,
    /// Error kind when generation fell back
    pub generation_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    /// `high`, `medium` or `low`
    pub confidence: String,
    pub suggestions: Vec<String>,
    pub sources: Vec<SourceEntry>,
    /// `semantic`, `structured` or `combined`
    pub route: String,
    pub status: RetrievalStatus,
    pub turn_count: usize,
    pub session_active: bool,
}

fn generation_label(status: &GenerationStatus) -> &'static str {
    match status {
        GenerationStatus::Completed { .. } => "completed",
        GenerationStatus::TimedOut { .. } => "timed_out",
        GenerationStatus::Failed { .. } => "failed",
        GenerationStatus::Skipped => "skipped",
    }
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        let generation = generation_label(&reply.generation).to_string();
        let generation_error = reply.generation.error_kind().map(str::to_string);
        Self {
            session_id: reply.session_id,
            response: reply.response,
            confidence: reply.confidence.to_string(),
            suggestions: reply.suggestions,
            sources: reply.sources.into_iter().map(SourceEntry::from).collect(),
            route: reply.route.to_string(),
            status: RetrievalStatus {
                semantic: reply.semantic.into(),
                structured: reply.structured.into(),
                partial: reply.partial,
                generation,
                generation_error,
            },
            turn_count: reply.turn_count,
            session_active: reply.session_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TurnEntry {
    /// `user` or `assistant`
    pub role: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<Turn> for TurnEntry {
    fn from(turn: Turn) -> Self {
        Self {
            role: turn.role.to_string(),
            content: turn.content,
            timestamp: turn.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<TurnEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClearSessionResponse {
    pub session_id: String,
    pub removed_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// `plain` (default) or `jsonl`
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CleanupRequest {
    /// Override for the configured inactivity threshold
    #[serde(default)]
    pub inactivity_threshold_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CleanupResponse {
    pub removed: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RebuildRequest {
    /// Knowledge file or directory; defaults to the configured path
    #[serde(default)]
    pub knowledge_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RebuildResponse {
    pub document_count: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IndexStatsResponse {
    pub total_chunks: usize,
    pub total_sources: usize,
    pub embedding_dimension: usize,
    pub last_rebuild: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<IndexStats> for IndexStatsResponse {
    fn from(stats: IndexStats) -> Self {
        Self {
            total_chunks: stats.total_chunks,
            total_sources: stats.total_sources,
            embedding_dimension: stats.embedding_dimension,
            last_rebuild: stats.last_rebuild,
        }
    }
}

fn default_search_limit() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchRequest {
    pub query: String,
    pub collection: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

impl From<SearchRequest> for SearchArgs {
    fn from(req: SearchRequest) -> Self {
        SearchArgs {
            query: req.query,
            collection: req.collection,
            limit: req.limit,
        }
    }
}

fn default_metric() -> String {
    "count".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AggregateRequest {
    pub collection: String,
    #[serde(default)]
    pub group_by: Option<String>,
    /// `count`, `sum` or `average`
    #[serde(default = "default_metric")]
    pub metric: String,
    /// Numeric field for `sum` / `average`
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub filters: HashMap<String, serde_json::Value>,
}

impl From<AggregateRequest> for AggregateArgs {
    fn from(req: AggregateRequest) -> Self {
        AggregateArgs {
            collection: req.collection,
            group_by: req.group_by,
            metric: req.metric,
            field: req.field,
            filters: req.filters.into_iter().collect::<BTreeMap<_, _>>(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FetchRequest {
    pub collection: String,
    pub id: String,
}

impl From<FetchRequest> for FetchArgs {
    fn from(req: FetchRequest) -> Self {
        FetchArgs {
            collection: req.collection,
            id: req.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EditRequest {
    pub collection: String,
    pub id: String,
    /// Field updates; `null` removes a field
    pub fields: HashMap<String, serde_json::Value>,
}

impl From<EditRequest> for EditArgs {
    fn from(req: EditRequest) -> Self {
        EditArgs {
            collection: req.collection,
            id: req.id,
            fields: req.fields.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateRequest {
    pub collection: String,
    pub fields: HashMap<String, serde_json::Value>,
}

impl From<CreateRequest> for CreateArgs {
    fn from(req: CreateRequest) -> Self {
        CreateArgs {
            collection: req.collection,
            fields: req.fields.into_iter().collect(),
        }
    }
}

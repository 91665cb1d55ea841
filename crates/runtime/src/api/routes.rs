//! HTTP API route handlers
//!
//! Each handler delegates to [`CampusAssistant`] and maps failures onto an
//! [`ErrorResponse`] whose status code follows the error kind.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::Json,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::OpenApi;

use super::types::{
    AggregateRequest, ChatRequestBody, ChatResponse, CleanupRequest, CleanupResponse,
    ClearSessionResponse, CreateRequest, EditRequest, ErrorResponse, ExportQuery, FetchRequest,
    HealthResponse, HistoryResponse, IndexStatsResponse, RebuildRequest, RebuildResponse,
    SearchRequest, TurnEntry,
};
use super::ApiDoc;
use crate::assistant::CampusAssistant;
use crate::session::ExportFormat;
use crate::types::AssistantError;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<CampusAssistant>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(assistant: Arc<CampusAssistant>) -> Self {
        Self {
            assistant,
            started_at: Instant::now(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Status code for an error kind
pub fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "ValidationError" => StatusCode::BAD_REQUEST,
        "NotFoundError" => StatusCode::NOT_FOUND,
        "InvalidCollectionError" | "InvalidAggregationError" => StatusCode::UNPROCESSABLE_ENTITY,
        "RetrievalUnavailable" | "EmbeddingUnavailable" | "StorageError" => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        "GenerationTimeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(error: AssistantError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for_kind(error.kind());
    if status.is_server_error() {
        tracing::error!(kind = error.kind(), error = %error, "Request failed");
    } else {
        tracing::debug!(kind = error.kind(), error = %error, "Request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error_kind: error.kind().to_string(),
            message: error.message(),
            details: error.details(),
        }),
    )
}

/// Unreadable request bodies are reported like any other validation error
fn request_body<T>(
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, (StatusCode, Json<ErrorResponse>)> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        let message = rejection.body_text();
        tracing::debug!(status = %rejection.status(), %message, "Request body rejected");
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error_kind: "ValidationError".to_string(),
                message,
                details: None,
            }),
        )
    })
}

fn to_value<T: serde::Serialize>(value: T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(value).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error_kind: "StorageError".to_string(),
                message: format!("failed to serialize result: {e}"),
                details: None,
            }),
        )
    })
}

/// Health check endpoint handler
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        indexed_chunks: state.assistant.document_count(),
        sessions: state.assistant.sessions().session_count(),
    })
}

/// Answer one chat message
#[utoipa::path(
    post,
    path = "/api/v1/chat",
    request_body = ChatRequestBody,
    responses(
        (status = 200, description = "Reply composed", body = ChatResponse),
        (status = 400, description = "Malformed message or session id", body = ErrorResponse)
    ),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<ApiState>,
    payload: Result<Json<ChatRequestBody>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let request = request_body(payload)?;
    state
        .assistant
        .chat(request.into())
        .await
        .map(|reply| Json(reply.into()))
        .map_err(error_response)
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/history",
    params(
        ("id" = String, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Session turns, oldest first", body = HistoryResponse),
        (status = 400, description = "Invalid session id", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn get_history(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> ApiResult<HistoryResponse> {
    let turns = state
        .assistant
        .history(&session_id)
        .await
        .map_err(error_response)?;
    Ok(Json(HistoryResponse {
        session_id,
        turns: turns.into_iter().map(TurnEntry::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/clear",
    params(
        ("id" = String, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Session history cleared", body = ClearSessionResponse),
        (status = 400, description = "Invalid session id", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn clear_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> ApiResult<ClearSessionResponse> {
    let removed_turns = state
        .assistant
        .clear_session(&session_id)
        .await
        .map_err(error_response)?;
    Ok(Json(ClearSessionResponse {
        session_id,
        removed_turns,
    }))
}

/// Export a transcript as plain text or JSON lines
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/export",
    params(
        ("id" = String, Path, description = "Session identifier"),
        ExportQuery
    ),
    responses(
        (status = 200, description = "Transcript", body = String),
        (status = 400, description = "Unknown format", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn export_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<([(header::HeaderName, &'static str); 1], String), (StatusCode, Json<ErrorResponse>)>
{
    let format = match query.format.as_deref() {
        Some(raw) => raw
            .parse::<ExportFormat>()
            .map_err(|e| error_response(e.into()))?,
        None => ExportFormat::default(),
    };
    let body = state
        .assistant
        .export_session(&session_id, format)
        .await
        .map_err(error_response)?;
    let content_type = match format {
        ExportFormat::Plain => "text/plain; charset=utf-8",
        ExportFormat::Jsonl => "application/x-ndjson",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

/// Drop sessions idle past the threshold
#[utoipa::path(
    post,
    path = "/api/v1/sessions/cleanup",
    request_body = CleanupRequest,
    responses(
        (status = 200, description = "Idle sessions removed", body = CleanupResponse),
        (status = 400, description = "Malformed request body", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn cleanup_sessions(
    State(state): State<ApiState>,
    payload: Result<Json<CleanupRequest>, JsonRejection>,
) -> ApiResult<CleanupResponse> {
    let request = request_body(payload)?;
    let removed = match request.inactivity_threshold_secs {
        Some(secs) => state
            .assistant
            .cleanup_sessions_older_than(Duration::from_secs(secs)),
        None => state.assistant.cleanup_sessions(),
    };
    Ok(Json(CleanupResponse {
        removed,
        remaining: state.assistant.sessions().session_count(),
    }))
}

/// Rebuild the embedding index from knowledge sources
#[utoipa::path(
    post,
    path = "/api/v1/index/rebuild",
    request_body = RebuildRequest,
    responses(
        (status = 200, description = "Index rebuilt", body = RebuildResponse),
        (status = 400, description = "Malformed request body", body = ErrorResponse),
        (status = 500, description = "Build failed, previous index kept", body = ErrorResponse)
    ),
    tag = "index"
)]
pub async fn rebuild_index(
    State(state): State<ApiState>,
    payload: Result<Json<RebuildRequest>, JsonRejection>,
) -> ApiResult<RebuildResponse> {
    let request = request_body(payload)?;
    let started = Instant::now();
    let source = request.knowledge_path.map(PathBuf::from);
    let document_count = state
        .assistant
        .rebuild_index(source.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(RebuildResponse {
        document_count,
        duration_ms: started.elapsed().as_millis() as u64,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/index/stats",
    responses(
        (status = 200, description = "Index statistics", body = IndexStatsResponse)
    ),
    tag = "index"
)]
pub async fn index_stats(State(state): State<ApiState>) -> Json<IndexStatsResponse> {
    Json(state.assistant.index_stats().into())
}

#[utoipa::path(
    get,
    path = "/api/v1/collections",
    responses(
        (status = 200, description = "Known collection names", body = Vec<String>)
    ),
    tag = "tools"
)]
pub async fn list_collections(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.assistant.collections())
}

/// Keyword search over one collection
#[utoipa::path(
    post,
    path = "/api/v1/tools/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Ranked records", body = serde_json::Value),
        (status = 400, description = "Malformed request body", body = ErrorResponse),
        (status = 422, description = "Unknown collection", body = ErrorResponse)
    ),
    tag = "tools"
)]
pub async fn search_records(
    State(state): State<ApiState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let request = request_body(payload)?;
    let hits = state
        .assistant
        .search(request.into())
        .await
        .map_err(error_response)?;
    to_value(hits)
}

/// Count, sum or average records, optionally grouped
#[utoipa::path(
    post,
    path = "/api/v1/tools/aggregate",
    request_body = AggregateRequest,
    responses(
        (status = 200, description = "Aggregate groups", body = serde_json::Value),
        (status = 400, description = "Malformed request body", body = ErrorResponse),
        (status = 422, description = "Invalid collection or aggregation", body = ErrorResponse)
    ),
    tag = "tools"
)]
pub async fn aggregate_records(
    State(state): State<ApiState>,
    payload: Result<Json<AggregateRequest>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let request = request_body(payload)?;
    let result = state
        .assistant
        .aggregate(request.into())
        .await
        .map_err(error_response)?;
    to_value(result)
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/fetch",
    request_body = FetchRequest,
    responses(
        (status = 200, description = "The record", body = serde_json::Value),
        (status = 400, description = "Malformed request body", body = ErrorResponse),
        (status = 404, description = "Record not found", body = ErrorResponse)
    ),
    tag = "tools"
)]
pub async fn fetch_record(
    State(state): State<ApiState>,
    payload: Result<Json<FetchRequest>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let request = request_body(payload)?;
    let record = state
        .assistant
        .fetch_by_id(request.into())
        .await
        .map_err(error_response)?;
    to_value(record)
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/edit",
    request_body = EditRequest,
    responses(
        (status = 200, description = "Updated record", body = serde_json::Value),
        (status = 400, description = "Update would break the schema", body = ErrorResponse),
        (status = 404, description = "Record not found", body = ErrorResponse)
    ),
    tag = "tools"
)]
pub async fn edit_record(
    State(state): State<ApiState>,
    payload: Result<Json<EditRequest>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let request = request_body(payload)?;
    let record = state
        .assistant
        .edit(request.into())
        .await
        .map_err(error_response)?;
    to_value(record)
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/create",
    request_body = CreateRequest,
    responses(
        (status = 200, description = "Created record", body = serde_json::Value),
        (status = 400, description = "Missing required fields", body = ErrorResponse)
    ),
    tag = "tools"
)]
pub async fn create_record(
    State(state): State<ApiState>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let request = request_body(payload)?;
    let record = state
        .assistant
        .create(request.into())
        .await
        .map_err(error_response)?;
    to_value(record)
}

/// OpenAPI document for this API
pub async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_for_kind() {
        assert_eq!(status_for_kind("ValidationError"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_kind("NotFoundError"), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for_kind("InvalidCollectionError"),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for_kind("StorageError"),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for_kind("IndexBuildError"),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_body() {
        let (status, Json(body)) =
            error_response(AssistantError::invalid_request("message must not be empty"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error_kind, "ValidationError");
        assert_eq!(body.message, "message must not be empty");
        assert!(body.details.is_none());
    }
}

//! HTTP API server implementation
//!
//! Serves the assistant over axum with optional CORS and request tracing.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::routes::{
    aggregate_records, chat, cleanup_sessions, clear_session, create_record, edit_record,
    export_session, fetch_record, get_history, health_check, index_stats, list_collections,
    openapi_document, rebuild_index, search_records, ApiState,
};
use crate::assistant::CampusAssistant;
use crate::config::ApiConfig;

/// HTTP API Server configuration
#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    /// Server bind address
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Enable request tracing
    pub enable_tracing: bool,
    /// Largest accepted request body in bytes
    pub max_body_size: usize,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self::from(&ApiConfig::default())
    }
}

impl From<&ApiConfig> for HttpApiConfig {
    fn from(api: &ApiConfig) -> Self {
        Self {
            bind_address: api.host.clone(),
            port: api.port,
            enable_cors: true,
            enable_tracing: true,
            max_body_size: api.max_body_size,
        }
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Server error: {reason}")]
    Serve { reason: String },
}

/// HTTP API Server
pub struct HttpApiServer {
    config: HttpApiConfig,
    assistant: Arc<CampusAssistant>,
}

impl HttpApiServer {
    pub fn new(config: HttpApiConfig, assistant: Arc<CampusAssistant>) -> Self {
        Self { config, assistant }
    }

    /// Start the HTTP API server and serve until the listener fails
    pub async fn start(&self) -> Result<(), ServerError> {
        let app = self.router();

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("HTTP API server starting on {}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Serve {
                reason: e.to_string(),
            })?;

        Ok(())
    }

    /// Build the router with all routes and middleware
    pub fn router(&self) -> Router {
        let state = ApiState::new(self.assistant.clone());

        let mut router = Router::new()
            .route("/api/v1/health", get(health_check))
            .route("/api/v1/openapi.json", get(openapi_document))
            .route("/api/v1/chat", post(chat))
            .route("/api/v1/sessions/cleanup", post(cleanup_sessions))
            .route("/api/v1/sessions/:id/history", get(get_history))
            .route("/api/v1/sessions/:id/clear", post(clear_session))
            .route("/api/v1/sessions/:id/export", get(export_session))
            .route("/api/v1/index/rebuild", post(rebuild_index))
            .route("/api/v1/index/stats", get(index_stats))
            .route("/api/v1/collections", get(list_collections))
            .route("/api/v1/tools/search", post(search_records))
            .route("/api/v1/tools/aggregate", post(aggregate_records))
            .route("/api/v1/tools/fetch", post(fetch_record))
            .route("/api/v1/tools/edit", post(edit_record))
            .route("/api/v1/tools/create", post(create_record))
            .with_state(state)
            .layer(DefaultBodyLimit::max(self.config.max_body_size));

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StorageBackend, StorageConfig};
    use crate::rag::HashingEmbeddingService;
    use crate::reasoning::ExtractiveInferenceProvider;
    use crate::tools::InMemoryRecordStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router() -> Router {
        let config = Config {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..Default::default()
            },
            ..Default::default()
        };
        let assistant = CampusAssistant::with_components(
            config,
            Arc::new(HashingEmbeddingService::new(64)),
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(ExtractiveInferenceProvider::default()),
        )
        .unwrap();
        HttpApiServer::new(HttpApiConfig::default(), Arc::new(assistant)).router()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let request = Request::get("/api/v1/health").body(Body::empty()).unwrap();
        let (status, body) = send(router(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["indexed_chunks"], 0);
    }

    #[tokio::test]
    async fn test_chat_endpoint_returns_reply() {
        let request = post_json(
            "/api/v1/chat",
            json!({ "message": "How many students are enrolled?", "session_id": "s-1" }),
        );
        let (status, body) = send(router(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], "s-1");
        assert_eq!(body["route"], "structured");
        assert_eq!(body["turn_count"], 2);
        assert!(body["response"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_chat_endpoint_rejects_empty_message() {
        let request = post_json("/api/v1/chat", json!({ "message": "  " }));
        let (status, body) = send(router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorKind"], "ValidationError");
    }

    #[tokio::test]
    async fn test_create_reports_missing_fields() {
        let request = post_json(
            "/api/v1/tools/create",
            json!({ "collection": "students", "fields": { "name": "Ada" } }),
        );
        let (status, body) = send(router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorKind"], "ValidationError");
        assert!(body["details"]["fields"].as_array().is_some());
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_validation_errors() {
        let missing_collection = post_json("/api/v1/tools/search", json!({ "query": "anything" }));
        let (status, body) = send(router(), missing_collection).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorKind"], "ValidationError");
        assert!(body["message"].as_str().unwrap().contains("collection"));

        let missing_message = post_json("/api/v1/chat", json!({ "session_id": "s-1" }));
        let (status, body) = send(router(), missing_message).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorKind"], "ValidationError");

        let not_json = Request::builder()
            .method("POST")
            .uri("/api/v1/tools/fetch")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(router(), not_json).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorKind"], "ValidationError");
    }

    #[tokio::test]
    async fn test_unknown_collection_is_unprocessable() {
        let request = post_json(
            "/api/v1/tools/search",
            json!({ "query": "anything", "collection": "dragons" }),
        );
        let (status, body) = send(router(), request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errorKind"], "InvalidCollectionError");
    }

    #[tokio::test]
    async fn test_export_unknown_session_is_not_found() {
        let request = Request::get("/api/v1/sessions/missing/export?format=jsonl")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errorKind"], "NotFoundError");
    }
}

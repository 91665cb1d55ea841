//! HTTP API module for the campus assistant
//!
//! The entire module is conditionally compiled based on the `http-api` feature flag.

#[cfg(feature = "http-api")]
pub mod routes;

#[cfg(feature = "http-api")]
pub mod server;

#[cfg(feature = "http-api")]
pub mod types;

#[cfg(feature = "http-api")]
pub use server::{HttpApiConfig, HttpApiServer, ServerError};

/// OpenAPI description of every route
#[cfg(feature = "http-api")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        routes::health_check,
        routes::chat,
        routes::get_history,
        routes::clear_session,
        routes::export_session,
        routes::cleanup_sessions,
        routes::rebuild_index,
        routes::index_stats,
        routes::list_collections,
        routes::search_records,
        routes::aggregate_records,
        routes::fetch_record,
        routes::edit_record,
        routes::create_record,
    ),
    components(schemas(
        types::HealthResponse,
        types::ErrorResponse,
        types::ChatRequestBody,
        types::ChatResponse,
        types::SourceEntry,
        types::PathStatusEntry,
        types::RetrievalStatus,
        types::TurnEntry,
        types::HistoryResponse,
        types::ClearSessionResponse,
        types::CleanupRequest,
        types::CleanupResponse,
        types::RebuildRequest,
        types::RebuildResponse,
        types::IndexStatsResponse,
        types::SearchRequest,
        types::AggregateRequest,
        types::FetchRequest,
        types::EditRequest,
        types::CreateRequest,
    )),
    tags(
        (name = "system", description = "Health and service metadata"),
        (name = "chat", description = "Question answering"),
        (name = "sessions", description = "Conversation history"),
        (name = "index", description = "Embedding index maintenance"),
        (name = "tools", description = "Structured record tools")
    )
)]
pub struct ApiDoc;

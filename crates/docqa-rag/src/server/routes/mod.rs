//! API routes for the document Q&A server

pub mod documents;
pub mod ingest;
pub mod query;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{delete, get, post},
    Json, Router,
};

use crate::server::state::AppState;
use crate::types::response::HealthResponse;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Upload - with larger body limit for file uploads
        .route(
            "/upload",
            post(ingest::upload_document).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Query
        .route("/query", post(query::query_documents))
        // Document management
        .route("/documents", get(documents::list_documents))
        .route("/documents/:document_id", delete(documents::delete_document))
        .route("/stats", get(documents::stats))
        .route("/compact", post(documents::compact))
        .route("/reindex", post(documents::reindex))
        .route("/health", get(health))
}

/// GET /api/v1/health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        vectorstore_ready: state.is_ready(),
    })
}

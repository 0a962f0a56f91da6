//! Document management endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ingestion::ReindexReport;
use crate::retrieval::CompactionReport;
use crate::server::state::AppState;
use crate::types::response::{DocumentDeleteResponse, DocumentListResponse, StatsResponse};

/// GET /api/v1/documents - List all documents
pub async fn list_documents(State(state): State<AppState>) -> Json<DocumentListResponse> {
    let documents = state.store().list_documents();
    tracing::info!("Document list requested: {} documents", documents.len());

    let total = documents.len();
    Json(DocumentListResponse { documents, total })
}

/// DELETE /api/v1/documents/:document_id - Delete a document and its chunks
pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentDeleteResponse>> {
    tracing::info!("Delete requested for document: {}", document_id);

    let info = state
        .store()
        .document(&document_id)
        .ok_or_else(|| Error::DocumentNotFound(document_id.clone()))?;

    // a concurrent delete may still win between lookup and removal
    let removed_chunks = state.ingestion().delete_document(&document_id).await?;
    if removed_chunks == 0 {
        return Err(Error::DocumentNotFound(document_id));
    }

    Ok(Json(DocumentDeleteResponse {
        message: format!("Document '{}' deleted successfully", info.filename),
        filename: info.filename,
        removed_chunks,
    }))
}

/// GET /api/v1/stats - Document and chunk counts
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.store().stats();

    Json(StatsResponse {
        total_documents: stats.documents,
        total_chunks: stats.live_chunks,
        ready: stats.live_chunks > 0,
        physical_slots: stats.physical_slots,
        dimension: stats.dimension,
    })
}

/// POST /api/v1/compact - Reclaim slots left by deleted chunks
pub async fn compact(State(state): State<AppState>) -> Result<Json<CompactionReport>> {
    let store = Arc::clone(state.store());
    let report = tokio::task::spawn_blocking(move || store.compact())
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

    Ok(Json(report))
}

/// POST /api/v1/reindex - Re-ingest every kept upload
pub async fn reindex(State(state): State<AppState>) -> Result<Json<ReindexReport>> {
    tracing::info!("Reindex requested");
    let report = state.ingestion().reindex_documents().await?;
    Ok(Json(report))
}

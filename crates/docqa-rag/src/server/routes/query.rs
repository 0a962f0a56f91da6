//! Query endpoint

use axum::{extract::State, Json};

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{AnswerResponse, QueryRequest};

/// POST /api/v1/query - Answer a question from the uploaded documents
pub async fn query_documents(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<AnswerResponse>> {
    let response = state.pipeline().query(&request).await?;
    Ok(Json(response))
}

//! Document upload endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use std::path::Path;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{response::UploadResponse, DocumentFormat};

/// POST /api/v1/upload - Upload and index one PDF, TXT or Markdown file
///
/// The file is read from the multipart field `file`. Its name becomes the
/// document id, so uploading the same name again replaces the old chunks.
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let start = Instant::now();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::config(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .and_then(|name| Path::new(name).file_name())
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::config("uploaded file has no file name"))?;
        let format = DocumentFormat::from_path(Path::new(&filename))?;

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::config(format!("Failed to read file: {}", e)))?;
        tracing::info!("Document upload requested: {} ({} bytes)", filename, data.len());

        let chunks_created = state
            .ingestion()
            .ingest(&filename, data.to_vec(), format)
            .await?;

        tracing::info!(
            "Document {} processed in {:.1}s",
            filename,
            start.elapsed().as_secs_f64()
        );

        return Ok(Json(UploadResponse {
            message: "Document processed successfully".to_string(),
            filename,
            chunks_created,
        }));
    }

    Err(Error::config("multipart field 'file' is required"))
}

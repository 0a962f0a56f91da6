//! Error types for the document Q&A system

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::QueryStage;

/// Result type alias for docqa operations
pub type Result<T> = std::result::Result<T, Error>;

/// docqa errors
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid chunking, retrieval or generation parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Document format outside the supported set
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// Document content could not be turned into text
    #[error("Failed to extract text from '{document_id}': {message}")]
    Extraction { document_id: String, message: String },

    /// Embedding backend failure
    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    /// An external call exceeded its time budget
    #[error("{service} did not respond within {timeout_secs}s")]
    UpstreamTimeout {
        service: &'static str,
        timeout_secs: u64,
    },

    /// Language model backend failure
    #[error("Generation service error: {0}")]
    GenerationService(String),

    /// Search attempted against a store holding zero chunks
    #[error("The index holds no chunks")]
    EmptyIndex,

    /// No chunks are stored for the document
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Index file and metadata file disagree
    #[error("Inconsistent store: {0}")]
    InconsistentStore(String),

    /// Vector dimension differs from the index dimension
    #[error("Embedding dimension mismatch: index uses {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Reading or writing the persisted index failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A query failed at a specific pipeline stage
    #[error("Query failed while {stage}: {source}")]
    Query {
        stage: QueryStage,
        #[source]
        source: Box<Error>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an extraction error
    pub fn extraction(document_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            document_id: document_id.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingService(message.into())
    }

    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationService(message.into())
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Attach the pipeline stage a query failed in
    pub fn at_stage(self, stage: QueryStage) -> Self {
        match self {
            already @ Self::Query { .. } => already,
            other => Self::Query {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Innermost error, looking through `Query` wrappers
    pub fn root(&self) -> &Error {
        match self {
            Self::Query { source, .. } => source.root(),
            other => other,
        }
    }

    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            Error::Configuration(_) => (StatusCode::BAD_REQUEST, "configuration_error"),
            Error::UnsupportedFormat(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format"),
            Error::Extraction { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "extraction_error"),
            Error::EmbeddingService(_) => (StatusCode::BAD_GATEWAY, "embedding_error"),
            Error::UpstreamTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            Error::GenerationService(_) => (StatusCode::BAD_GATEWAY, "generation_error"),
            Error::EmptyIndex => (StatusCode::NOT_FOUND, "empty_index"),
            Error::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "document_not_found"),
            Error::InconsistentStore(_) => (StatusCode::INTERNAL_SERVER_ERROR, "inconsistent_store"),
            Error::DimensionMismatch { .. } => (StatusCode::BAD_REQUEST, "dimension_mismatch"),
            Error::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error"),
            Error::Query { source, .. } => source.status_and_type(),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        let mut body = json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        });
        if let Error::Query { stage, .. } = &self {
            body["error"]["stage"] = json!(stage);
        }

        (status, Json(body)).into_response()
    }
}

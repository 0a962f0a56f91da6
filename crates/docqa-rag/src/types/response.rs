//! Response types for queries and document management

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::{DocumentId, DocumentSummary};
use crate::retrieval::SearchHit;

/// A retrieved chunk cited by an answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    /// Source document
    pub document_id: DocumentId,
    /// Chunk ID
    pub chunk_id: Uuid,
    /// Chunk position within the document
    pub ordinal: u32,
    /// Chunk text
    pub text: String,
    /// Page the chunk starts on, for PDFs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Cosine similarity to the question
    pub score: f32,
}

impl From<SearchHit> for Source {
    fn from(hit: SearchHit) -> Self {
        Self {
            document_id: hit.metadata.document_id,
            chunk_id: hit.chunk_id,
            ordinal: hit.metadata.ordinal,
            page: hit.metadata.page,
            text: hit.metadata.text,
            score: hit.score,
        }
    }
}

/// Answer to a question with its sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// The original question
    pub question: String,
    /// Generated answer
    pub answer: String,
    /// Chunks the answer was grounded on, most similar first
    pub sources: Vec<Source>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Upload result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub chunks_created: usize,
}

/// Document listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentSummary>,
    pub total: usize,
}

/// Deletion result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDeleteResponse {
    pub message: String,
    pub filename: String,
    pub removed_chunks: usize,
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_documents: usize,
    pub total_chunks: usize,
    /// Whether at least one chunk can be searched
    pub ready: bool,
    /// Physical slots, including logically deleted ones
    pub physical_slots: usize,
    pub dimension: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub vectorstore_ready: bool,
}

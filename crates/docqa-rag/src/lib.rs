//! docqa-rag: document Q&A with retrieval-augmented generation
//!
//! Uploaded documents are split into overlapping chunks, embedded through an
//! external embedding service and stored in a persisted flat vector index
//! with a parallel metadata store. Questions are answered by retrieving the
//! most similar chunks and asking a language model to answer from them,
//! returning the answer together with its sources.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use ingestion::{Chunker, IngestionService, TextChunk};
pub use pipeline::{QueryStage, RagPipeline};
pub use retrieval::{IndexStore, LoadReport, SearchHit};
pub use types::{
    document::{ChunkMetadata, DocumentFormat, DocumentId, DocumentSummary},
    query::{GenerationOptions, QueryRequest},
    response::{AnswerResponse, Source},
};

//! Core types for the Q&A system

pub mod document;
pub mod query;
pub mod response;

pub use document::{ChunkMetadata, DocumentFormat, DocumentId, DocumentInfo, DocumentSummary};
pub use query::{GenerationOptions, QueryRequest};
pub use response::{AnswerResponse, Source};

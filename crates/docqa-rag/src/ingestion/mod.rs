//! Document ingestion pipeline

mod chunker;
mod parser;
mod service;

pub use chunker::{ChunkIter, Chunker, TextChunk};
pub use parser::{ExtractedText, FileParser};
pub use service::{IngestionService, ReindexReport};

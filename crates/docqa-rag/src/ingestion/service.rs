//! Document ingestion: extract, chunk, embed, commit
//!
//! Extraction and chunking happen first, embedding runs without touching the
//! store, and the result is committed with a single `replace_document`
//! call. A failure at any step leaves the previously stored version intact.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::chunker::{Chunker, TextChunk};
use super::parser::FileParser;
use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::providers::embedding::check_embeddings;
use crate::providers::{with_timeout, EmbeddingProvider};
use crate::retrieval::{persistence, IndexEntry, IndexStore};
use crate::types::{ChunkMetadata, DocumentFormat, DocumentId, DocumentInfo};

/// Result of re-ingesting the kept uploads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub documents: usize,
    pub chunks: usize,
    /// Files that could not be re-ingested
    pub failed: Vec<String>,
}

/// Drives parser, chunker, embedder and index store for one document at a time
pub struct IngestionService {
    store: Arc<IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    embed_timeout: Duration,
    /// Where raw uploads are kept; `None` keeps nothing
    documents_dir: Option<PathBuf>,
}

impl IngestionService {
    /// Create a new ingestion service
    pub fn new(
        store: Arc<IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Chunker,
        embed_timeout: Duration,
    ) -> Result<Self> {
        if embedder.dimensions() != store.dimension() {
            return Err(Error::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimensions(),
            });
        }

        Ok(Self {
            store,
            embedder,
            chunker,
            embed_timeout,
            documents_dir: None,
        })
    }

    /// Keep a copy of every ingested upload in `dir`
    pub fn with_documents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.documents_dir = Some(dir.into());
        self
    }

    /// Create from configuration
    pub fn from_config(
        config: &RagConfig,
        store: Arc<IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        Ok(Self::new(
            store,
            embedder,
            Chunker::from_config(&config.chunking)?,
            Duration::from_secs(config.embeddings.timeout_secs),
        )?
        .with_documents_dir(&config.storage.documents_dir))
    }

    /// Ingest a document, replacing any previous version with the same id.
    ///
    /// Returns the number of chunks stored. Text that yields no chunks is a
    /// no-op and leaves a previous version untouched. With a documents
    /// directory set, the raw bytes are kept there once the chunks are
    /// committed.
    pub async fn ingest(
        &self,
        document_id: &str,
        content: Vec<u8>,
        format: DocumentFormat,
    ) -> Result<usize> {
        let (count, content) = self.index_document(document_id, content, format).await?;
        if count > 0 {
            self.keep_upload(document_id, content).await;
        }
        Ok(count)
    }

    async fn index_document(
        &self,
        document_id: &str,
        content: Vec<u8>,
        format: DocumentFormat,
    ) -> Result<(usize, Vec<u8>)> {
        if document_id.trim().is_empty() {
            return Err(Error::config("document id must not be empty"));
        }

        let id = document_id.to_string();
        let (extracted, content) = tokio::task::spawn_blocking(move || {
            FileParser::extract_pages(&id, &content, format).map(|extracted| (extracted, content))
        })
        .await
        .map_err(|e| Error::extraction(document_id, format!("extraction task failed: {}", e)))??;
        let text = &extracted.text;

        let chunks: Vec<TextChunk> = self.chunker.chunks(text).collect();
        if chunks.is_empty() {
            tracing::info!("{} produced no chunks, nothing to ingest", document_id);
            return Ok((0, content));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = with_timeout(
            "embedding service",
            self.embed_timeout,
            self.embedder.embed(&texts),
        )
        .await?;
        check_embeddings(&vectors, chunks.len(), self.store.dimension())?;

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexEntry {
                embedding,
                metadata: ChunkMetadata {
                    chunk_id: Uuid::new_v4(),
                    document_id: document_id.to_string(),
                    ordinal: chunk.ordinal,
                    text: chunk.text,
                    char_start: chunk.char_start,
                    char_end: chunk.char_end,
                    page: extracted.page_at(chunk.char_start),
                },
            })
            .collect();
        let count = entries.len();

        let info = DocumentInfo::new(document_id, format, text);
        let store = Arc::clone(&self.store);
        let replaced = tokio::task::spawn_blocking(move || store.replace_document(info, entries))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        if replaced > 0 {
            tracing::info!(
                "Re-ingested {}: replaced {} chunks with {}",
                document_id,
                replaced,
                count
            );
        } else {
            tracing::info!("Ingested {} ({} chunks)", document_id, count);
        }
        Ok((count, content))
    }

    /// Path of the kept copy of `document_id`, if copies are kept and the id
    /// is a plain file name
    fn upload_path(&self, document_id: &str) -> Option<(&Path, PathBuf)> {
        let dir = self.documents_dir.as_deref()?;
        let name = Path::new(document_id).file_name()?;
        (name == document_id).then(|| (dir, dir.join(name)))
    }

    async fn keep_upload(&self, document_id: &str, content: Vec<u8>) {
        let Some((dir, _)) = self.upload_path(document_id) else {
            return;
        };

        let dir = dir.to_path_buf();
        let name = document_id.to_string();
        let saved = tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)
                .map_err(|e| Error::persistence(format!("create {}: {}", dir.display(), e)))?;
            persistence::write_atomic(&dir, &name, &content)
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))
        .and_then(|saved| saved);

        match saved {
            Ok(()) => tracing::debug!("Kept upload {}", document_id),
            Err(e) => tracing::warn!("Failed to keep upload {}: {}", document_id, e),
        }
    }

    /// Re-ingest every kept upload, e.g. into a fresh index after the
    /// embedding model changed
    pub async fn reindex_documents(&self) -> Result<ReindexReport> {
        let dir = self
            .documents_dir
            .as_deref()
            .ok_or_else(|| Error::config("no documents directory is configured"))?;

        let mut report = ReindexReport::default();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        for path in paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let Ok(format) = DocumentFormat::from_path(&path) else {
                continue;
            };

            let outcome = match tokio::fs::read(&path).await {
                Ok(content) => self.index_document(&name, content, format).await,
                Err(e) => Err(e.into()),
            };
            match outcome {
                Ok((chunks, _)) => {
                    report.documents += 1;
                    report.chunks += chunks;
                }
                Err(e) => {
                    tracing::warn!("Failed to re-ingest {}: {}", name, e);
                    report.failed.push(name);
                }
            }
        }

        tracing::info!(
            "Re-ingested {} documents ({} chunks, {} failed)",
            report.documents,
            report.chunks,
            report.failed.len()
        );
        Ok(report)
    }

    /// Ingest a file from disk; the id is the file name and the format comes
    /// from its extension
    pub async fn ingest_file(&self, path: &Path) -> Result<(DocumentId, usize)> {
        let document_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::config(format!("{} has no usable file name", path.display())))?
            .to_string();
        let format = DocumentFormat::from_path(path)?;
        let content = tokio::fs::read(path).await?;

        let count = self.ingest(&document_id, content, format).await?;
        Ok((document_id, count))
    }

    /// Delete a document and its kept upload, returning how many chunks
    /// were removed
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let store = Arc::clone(&self.store);
        let id = document_id.to_string();
        let removed = tokio::task::spawn_blocking(move || store.delete(&id))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        if removed > 0 {
            if let Some((_, path)) = self.upload_path(document_id) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => tracing::debug!("Removed kept upload {}", path.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }
        Ok(removed)
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn documents_dir(&self) -> Option<&Path> {
        self.documents_dir.as_deref()
    }
}

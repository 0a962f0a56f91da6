//! Application state for the HTTP server

use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::ingestion::IngestionService;
use crate::pipeline::RagPipeline;
use crate::providers::{build_embedder, build_llm, EmbeddingProvider, LlmProvider};
use crate::retrieval::IndexStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: RagConfig,
    store: Arc<IndexStore>,
    ingestion: IngestionService,
    pipeline: RagPipeline,
}

impl AppState {
    /// Wire the services around an opened store and its providers
    pub fn new(
        config: RagConfig,
        store: Arc<IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let ingestion = IngestionService::from_config(&config, Arc::clone(&store), Arc::clone(&embedder))?;
        let pipeline = RagPipeline::from_config(&config, Arc::clone(&store), embedder, llm)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                ingestion,
                pipeline,
            }),
        })
    }

    /// Open the index named by `config` and build the configured providers
    pub fn open(config: RagConfig) -> Result<Self> {
        tracing::info!(
            "Initializing application state (index: {})",
            config.storage.index_dir.display()
        );

        let (store, report) = IndexStore::open(&config.storage.index_dir, config.embeddings.dimensions)?;
        tracing::info!(
            "Index loaded: {} documents, {} chunks",
            report.documents,
            report.live_chunks
        );

        let embedder = build_embedder(&config.embeddings)?;
        let llm = build_llm(&config.llm)?;
        tracing::info!(
            "Providers ready (embeddings: {}, llm: {} / {})",
            embedder.name(),
            llm.name(),
            llm.model()
        );

        Self::new(config, Arc::new(store), embedder, llm)
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.inner.store
    }

    pub fn ingestion(&self) -> &IngestionService {
        &self.inner.ingestion
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.inner.pipeline
    }

    /// True once at least one chunk is searchable
    pub fn is_ready(&self) -> bool {
        self.inner.store.chunk_count() > 0
    }
}

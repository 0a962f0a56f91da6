//! Retrieval-generation orchestration
//!
//! One query moves through `Idle -> Embedding -> Retrieving -> (NoMatch |
//! Generating) -> Done`, or ends in `Failed`. Failures after validation are
//! reported as `Error::Query` carrying the stage they happened in. The
//! pipeline only reads from the index.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{RagConfig, MAX_TOP_K};
use crate::error::{Error, Result};
use crate::generation::{PromptBuilder, NO_DOCUMENTS_ANSWER};
use crate::providers::{with_timeout, EmbeddingProvider, LlmProvider};
use crate::retrieval::{IndexStore, SearchHit};
use crate::types::{AnswerResponse, GenerationOptions, QueryRequest, Source};

/// Stage of a single query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Idle,
    Embedding,
    Retrieving,
    NoMatch,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::NoMatch => "no match",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the stage of one query for logging
struct QueryRun {
    stage: QueryStage,
    started: Instant,
}

impl QueryRun {
    fn start() -> Self {
        Self {
            stage: QueryStage::Idle,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: QueryStage) {
        tracing::debug!("query stage {} -> {}", self.stage, next);
        self.stage = next;
    }

    /// Tag `error` with the current stage and move to `Failed`
    fn fail(&mut self, error: Error) -> Error {
        let stage = self.stage;
        tracing::error!("Query failed while {}: {}", stage, error);
        self.advance(QueryStage::Failed);
        error.at_stage(stage)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Answers questions from the indexed documents
pub struct RagPipeline {
    store: Arc<IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    default_k: usize,
    defaults: GenerationOptions,
    embed_timeout: Duration,
    llm_timeout: Duration,
}

impl RagPipeline {
    /// Create a pipeline with default retrieval and generation settings
    pub fn new(
        store: Arc<IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        Self::from_config(&RagConfig::default(), store, embedder, llm)
    }

    /// Create from configuration
    pub fn from_config(
        config: &RagConfig,
        store: Arc<IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
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
            llm,
            default_k: config.retrieval.default_k,
            defaults: config.llm.generation_defaults(),
            embed_timeout: Duration::from_secs(config.embeddings.timeout_secs),
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
        })
    }

    /// Override the external call timeouts
    pub fn with_timeouts(mut self, embed_timeout: Duration, llm_timeout: Duration) -> Self {
        self.embed_timeout = embed_timeout;
        self.llm_timeout = llm_timeout;
        self
    }

    /// Answer a request, filling unset parameters from the defaults
    pub async fn query(&self, request: &QueryRequest) -> Result<AnswerResponse> {
        let k = request.k.unwrap_or(self.default_k);
        self.answer(&request.question, k, request.options(&self.defaults))
            .await
    }

    /// Answer `question` from the `k` most similar chunks
    pub async fn answer(
        &self,
        question: &str,
        k: usize,
        options: GenerationOptions,
    ) -> Result<AnswerResponse> {
        validate(question, k, &options)?;
        let mut run = QueryRun::start();
        tracing::info!("Processing query: '{}' (k={})", preview(question), k);

        if self.store.chunk_count() == 0 {
            tracing::warn!("Index is empty, skipping retrieval");
            run.advance(QueryStage::NoMatch);
            return Ok(self.fallback(question, NO_DOCUMENTS_ANSWER, &mut run));
        }

        run.advance(QueryStage::Embedding);
        let query_vector = match with_timeout(
            "embedding service",
            self.embed_timeout,
            self.embedder.embed_query(question),
        )
        .await
        {
            Ok(vector) => vector,
            Err(e) => return Err(run.fail(e)),
        };

        run.advance(QueryStage::Retrieving);
        let hits = match self.retrieve(query_vector, k).await {
            Ok(hits) => hits,
            // the last document was deleted while the question was embedded
            Err(Error::EmptyIndex) => Vec::new(),
            Err(e) => return Err(run.fail(e)),
        };
        if hits.is_empty() {
            run.advance(QueryStage::NoMatch);
            return Ok(self.fallback(question, NO_DOCUMENTS_ANSWER, &mut run));
        }

        run.advance(QueryStage::Generating);
        let context = PromptBuilder::build_context(&hits);
        let prompt = PromptBuilder::build_rag_prompt(question, &context);
        let answer = match with_timeout(
            "language model",
            self.llm_timeout,
            self.llm.generate(&prompt, &options),
        )
        .await
        {
            Ok(answer) => answer,
            Err(e) => return Err(run.fail(e)),
        };

        run.advance(QueryStage::Done);
        tracing::info!(
            "Query processed successfully, {} sources used ({} ms)",
            hits.len(),
            run.elapsed_ms()
        );

        Ok(AnswerResponse {
            question: question.to_string(),
            answer,
            sources: hits.into_iter().map(Source::from).collect(),
            processing_time_ms: run.elapsed_ms(),
        })
    }

    async fn retrieve(&self, query_vector: Vec<f32>, k: usize) -> Result<Vec<SearchHit>> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.search(&query_vector, k))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    fn fallback(&self, question: &str, answer: &str, run: &mut QueryRun) -> AnswerResponse {
        run.advance(QueryStage::Done);
        AnswerResponse {
            question: question.to_string(),
            answer: answer.to_string(),
            sources: Vec::new(),
            processing_time_ms: run.elapsed_ms(),
        }
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }
}

fn validate(question: &str, k: usize, options: &GenerationOptions) -> Result<()> {
    if question.trim().is_empty() {
        return Err(Error::config("question must not be empty"));
    }
    if !(1..=MAX_TOP_K).contains(&k) {
        return Err(Error::config(format!(
            "k must be within 1..={}, got {}",
            MAX_TOP_K, k
        )));
    }
    options.validate()
}

fn preview(question: &str) -> String {
    let mut preview: String = question.chars().take(100).collect();
    if preview.len() < question.len() {
        preview.push_str("...");
    }
    preview
}

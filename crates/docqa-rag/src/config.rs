//! Configuration for the document Q&A system
//!
//! Defaults mirror a small single-node deployment: Ollama for embeddings,
//! either Ollama or Groq for generation, and an index directory under the
//! user's local data dir. `RagConfig::load` layers an optional TOML file and
//! `DOCQA_*` environment variables on top of the defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::GenerationOptions;

/// Upper bound on retrieved chunks per query
pub const MAX_TOP_K: usize = 10;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Language model configuration
    pub llm: LlmConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Index storage configuration
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Ollama base URL serving the embedding model
    pub base_url: String,
    /// Embedding model name
    pub model: String,
    /// Embedding dimensions, fixed for the lifetime of an index
    pub dimensions: usize,
    /// Texts per request to the embedding backend
    pub batch_size: usize,
    /// Prefix prepended to document chunks before embedding
    pub document_prefix: String,
    /// Prefix prepended to queries before embedding
    pub query_prefix: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: 32,
            document_prefix: "search_document: ".to_string(),
            query_prefix: "search_query: ".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    /// How far back from the hard limit to look for a whitespace break
    pub boundary_window: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            boundary_window: 100,
        }
    }
}

/// Which backend answers generation requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Local Ollama server
    #[default]
    Ollama,
    /// Groq hosted OpenAI-compatible API
    Groq,
}

impl std::str::FromStr for LlmBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "groq" => Ok(Self::Groq),
            other => Err(Error::config(format!("unknown LLM provider '{}'", other))),
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Generation backend
    pub provider: LlmBackend,
    /// Ollama base URL
    pub ollama_url: String,
    /// Ollama generation model
    pub ollama_model: String,
    /// Groq API base URL
    pub groq_url: String,
    /// Groq model name
    pub groq_model: String,
    /// Groq API key (usually supplied through `GROQ_API_KEY`)
    #[serde(skip_serializing)]
    pub groq_api_key: Option<String>,
    /// Default sampling temperature
    pub temperature: f32,
    /// Default completion budget in tokens
    pub max_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmBackend::Ollama,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2:3b".to_string(),
            groq_url: "https://api.groq.com/openai/v1".to_string(),
            groq_model: "openai/gpt-oss-120b".to_string(),
            groq_api_key: None,
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    /// Sampling options used when a query does not set its own
    pub fn generation_defaults(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Model name of the active backend
    pub fn model(&self) -> &str {
        match self.provider {
            LlmBackend::Ollama => &self.ollama_model,
            LlmBackend::Groq => &self.groq_model,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks retrieved when a request does not specify `k`
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { default_k: 4 }
    }
}

/// Index storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the vector file and the metadata file
    pub index_dir: PathBuf,
    /// Directory keeping a copy of every ingested upload, used to rebuild
    /// the index after an embedding model change
    pub documents_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docqa");

        Self {
            index_dir: base.join("index"),
            documents_dir: base.join("documents"),
        }
    }
}

impl RagConfig {
    /// Load configuration: defaults, then the TOML file (if any), then
    /// environment variables. The result is validated.
    ///
    /// When `path` is `None`, `DOCQA_CONFIG` names the file; a missing file
    /// is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("DOCQA_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) if path.exists() => Self::from_toml_file(&path)?,
            Some(path) => {
                tracing::warn!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parse TOML configuration text; missing keys keep their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::config(format!("invalid config file: {}", e)))
    }

    /// Apply `DOCQA_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, value: String) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("{} has an invalid value '{}'", key, value)))
        }

        if let Some(v) = lookup("DOCQA_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("DOCQA_PORT") {
            self.server.port = parsed("DOCQA_PORT", v)?;
        }
        if let Some(v) = lookup("DOCQA_INDEX_DIR") {
            self.storage.index_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DOCQA_DOCUMENTS_DIR") {
            self.storage.documents_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DOCQA_CHUNK_SIZE") {
            self.chunking.chunk_size = parsed("DOCQA_CHUNK_SIZE", v)?;
        }
        if let Some(v) = lookup("DOCQA_CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parsed("DOCQA_CHUNK_OVERLAP", v)?;
        }
        if let Some(v) = lookup("DOCQA_EMBED_URL") {
            self.embeddings.base_url = v;
        }
        if let Some(v) = lookup("DOCQA_EMBED_MODEL") {
            self.embeddings.model = v;
        }
        if let Some(v) = lookup("DOCQA_EMBED_DIMENSIONS") {
            self.embeddings.dimensions = parsed("DOCQA_EMBED_DIMENSIONS", v)?;
        }
        if let Some(v) = lookup("DOCQA_LLM_PROVIDER") {
            self.llm.provider = v.parse()?;
        }
        if let Some(v) = lookup("DOCQA_OLLAMA_URL") {
            self.llm.ollama_url = v;
        }
        if let Some(v) = lookup("DOCQA_LLM_MODEL") {
            match self.llm.provider {
                LlmBackend::Ollama => self.llm.ollama_model = v,
                LlmBackend::Groq => self.llm.groq_model = v,
            }
        }
        if let Some(v) = lookup("GROQ_API_KEY") {
            self.llm.groq_api_key = Some(v);
        }
        if let Some(v) = lookup("DOCQA_TEMPERATURE") {
            self.llm.temperature = parsed("DOCQA_TEMPERATURE", v)?;
        }
        if let Some(v) = lookup("DOCQA_MAX_TOKENS") {
            self.llm.max_tokens = parsed("DOCQA_MAX_TOKENS", v)?;
        }

        Ok(())
    }

    /// Reject parameter combinations that would fail later at runtime
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(Error::config("chunk_size must be positive"));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::config("embedding dimensions must be positive"));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::config("embedding batch_size must be positive"));
        }
        if !(1..=MAX_TOP_K).contains(&self.retrieval.default_k) {
            return Err(Error::config(format!(
                "retrieval.default_k must be within 1..={}",
                MAX_TOP_K
            )));
        }
        if !(0.0..=1.0).contains(&self.llm.temperature) {
            return Err(Error::config("llm.temperature must be within 0..=1"));
        }
        if !(1..=4096).contains(&self.llm.max_tokens) {
            return Err(Error::config("llm.max_tokens must be within 1..=4096"));
        }
        if self.llm.provider == LlmBackend::Groq
            && self.llm.groq_api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(Error::config("Groq provider selected but GROQ_API_KEY is not set"));
        }
        Ok(())
    }
}

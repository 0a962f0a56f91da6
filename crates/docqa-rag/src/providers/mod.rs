//! Provider abstractions for embeddings and text generation
//!
//! The embedding model and the language model are external services; these
//! traits are the only surface the rest of the crate sees.

pub mod embedding;
pub mod groq;
pub mod llm;
pub mod ollama;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmBackend, LlmConfig};
use crate::error::{Error, Result};

pub use embedding::EmbeddingProvider;
pub use groq::GroqLlm;
pub use llm::LlmProvider;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLlm};

/// Create the configured embedding provider
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(OllamaEmbedder::new(config)?))
}

/// Create the configured generation provider
pub fn build_llm(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let llm: Arc<dyn LlmProvider> = match config.provider {
        LlmBackend::Ollama => Arc::new(OllamaLlm::new(config)?),
        LlmBackend::Groq => Arc::new(GroqLlm::new(config)?),
    };
    Ok(llm)
}

/// Bound an external call, surfacing expiry as `UpstreamTimeout`
pub async fn with_timeout<T, F>(service: &'static str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} timed out after {:?}", service, limit);
            Err(Error::UpstreamTimeout {
                service,
                timeout_secs: limit.as_secs(),
            })
        }
    }
}

/// Map a transport error, keeping client-side timeouts distinct
pub(crate) fn request_error(
    service: &'static str,
    timeout_secs: u64,
    error: reqwest::Error,
    wrap: fn(String) -> Error,
) -> Error {
    if error.is_timeout() {
        Error::UpstreamTimeout {
            service,
            timeout_secs,
        }
    } else {
        wrap(format!("{} request failed: {}", service, error))
    }
}

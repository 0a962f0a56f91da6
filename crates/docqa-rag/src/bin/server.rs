//! Document Q&A server binary
//!
//! Run with: cargo run -p docqa-rag --bin docqa-server
//!
//! Configuration is read from the TOML file named by `DOCQA_CONFIG` (if set),
//! then overridden by `DOCQA_*` environment variables.

use docqa_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docqa_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RagConfig::load(None)?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!("  - Embedding dimensions: {}", config.embeddings.dimensions);
    tracing::info!("  - LLM: {:?} / {}", config.llm.provider, config.llm.model());
    tracing::info!(
        "  - Chunking: {} chars, {} overlap",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!("  - Index directory: {}", config.storage.index_dir.display());
    tracing::info!("  - Documents directory: {}", config.storage.documents_dir.display());

    let server = RagServer::new(config)?;
    let state = server.state();

    match state.pipeline().embedder().health_check().await {
        Ok(true) => tracing::info!("Embedding service is reachable"),
        _ => tracing::warn!(
            "Embedding service not available at {}, uploads and queries will fail until it is",
            state.config().embeddings.base_url
        ),
    }
    match state.pipeline().llm().health_check().await {
        Ok(true) => tracing::info!("Language model is reachable"),
        _ => tracing::warn!("Language model {} not available", state.config().llm.model()),
    }

    println!("\nServer starting...");
    println!("  API: http://{}/api/v1", server.address());
    println!("  Health: http://{}/api/v1/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /api/v1/upload          - Upload a PDF, TXT or Markdown file");
    println!("  POST   /api/v1/query           - Ask a question");
    println!("  GET    /api/v1/documents       - List documents");
    println!("  DELETE /api/v1/documents/:id   - Delete a document");
    println!("  GET    /api/v1/stats           - Index statistics");
    println!("  POST   /api/v1/compact         - Reclaim deleted slots");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}

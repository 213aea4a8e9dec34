mod config;
mod description;
mod embedding;
mod errors;
mod extraction;
mod llm_client;
mod normalizer;
mod ranking;
mod retry;
mod routes;
mod search;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, SearchBackendConfig};
use crate::extraction::PdfTextExtractor;
use crate::llm_client::LlmClient;
use crate::normalizer::TextNormalizer;
use crate::ranking::pipeline::{RankingPipeline, RankingSettings};
use crate::retry::RetryPolicy;
use crate::routes::build_router;
use crate::search::{AzureSearchIndex, MemoryVectorIndex, VectorIndex};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV match API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Azure OpenAI client (chat + embeddings)
    let retry = RetryPolicy::new(config.llm_max_retries);
    let llm = Arc::new(LlmClient::new(&config.openai, retry)?);
    info!(
        "LLM client initialized (chat: {}, embeddings: {})",
        llm.chat_deployment(),
        config.openai.embedding_deployment
    );

    // Initialize vector index backend
    let index: Arc<dyn VectorIndex> = match &config.search {
        SearchBackendConfig::Azure {
            endpoint,
            api_key,
            index_name,
        } => Arc::new(AzureSearchIndex::new(
            endpoint,
            api_key,
            index_name,
            config.embedding_dimension,
            retry,
        )?),
        SearchBackendConfig::Memory => Arc::new(MemoryVectorIndex::new(config.embedding_dimension)),
    };
    info!(
        "Vector index initialized (backend: {}, dimension: {})",
        config.search.name(),
        config.embedding_dimension
    );

    let ranking = RankingPipeline::new(
        Arc::new(PdfTextExtractor),
        TextNormalizer::new(llm.clone()),
        llm.clone(),
        index.clone(),
        RankingSettings::from_config(&config),
    );

    // Build app state
    let state = AppState {
        chat: llm,
        ranking,
        index,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

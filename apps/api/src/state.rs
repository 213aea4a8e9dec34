use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::ChatModel;
use crate::ranking::pipeline::RankingPipeline;
use crate::search::VectorIndex;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Chat model used directly by description generation.
    pub chat: Arc<dyn ChatModel>,
    pub ranking: RankingPipeline,
    /// Same index the ranking pipeline writes to; exposed for the admin reset route.
    pub index: Arc<dyn VectorIndex>,
    pub config: Config,
}

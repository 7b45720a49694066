use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::llm_client::LlmProvider;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Model provider. Default: `OpenAiClient`.
    pub llm: Arc<dyn LlmProvider>,
    pub config: Config,
}

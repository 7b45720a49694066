pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::history::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/models", get(handlers::handle_list_models))
        .route(
            "/api/v1/projects",
            get(handlers::handle_list_projects).post(handlers::handle_create_project),
        )
        .route("/api/v1/projects/:id", get(handlers::handle_get_project))
        .route("/api/v1/history", get(handlers::handle_history))
        .route("/api/v1/prompts/:id", get(handlers::handle_get_prompt))
        .route(
            "/api/v1/prompts/:id/drift",
            get(handlers::handle_prompt_drift),
        )
        .route(
            "/api/v1/variables",
            post(handlers::handle_reconcile_variables),
        )
        .route("/api/v1/embeddings", post(handlers::handle_embedding))
        .route("/api/v1/generations", post(handlers::handle_generation))
        .with_state(state)
}

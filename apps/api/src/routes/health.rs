use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::db::ping;
use crate::state::AppState;

/// GET /health
/// Reports service version and whether the database answers.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = ping(&state.db).await.is_ok();
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database { "ok" } else { "degraded" },
            "database": database,
            "version": env!("CARGO_PKG_VERSION"),
            "service": "promptr-api"
        })),
    )
}

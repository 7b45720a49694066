//! Axum route handlers for projects, models, prompt history and submissions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{models_by_category, ModelsByCategory};
use crate::drift::view::{prompt_drift_view, trend_series, PromptDriftView, TrendPoint};
use crate::drift::{
    annotate_history, Deviation, DriftError, DriftLimits, DriftReport, PairWarning, PromptVector,
};
use crate::errors::AppError;
use crate::history::service::{
    submit_embedding, submit_generation, EmbeddingResponse, GenerationResponse, SubmitRequest,
};
use crate::history::store::{
    create_project, list_projects, project_by_id, prompt_by_id, prompt_history, prompt_neighbours,
    ProjectDetail,
};
use crate::models::project::ProjectRow;
use crate::models::prompt::PromptDetail;
use crate::prompting::{extract_variables, reconcile_variables, stored_prompt_hash, Variables};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub project_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub deviation_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DriftQuery {
    pub deviation_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub prompt: PromptDetail,
    pub hash: String,
    pub previous_similarity: Option<f64>,
    pub next_similarity: Option<f64>,
    pub previous_deviation: Option<Vec<Deviation>>,
    pub next_deviation: Option<Vec<Deviation>>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub prompts: Vec<HistoryEntry>,
    pub warnings: Vec<PairWarning>,
    pub trend: Vec<TrendPoint>,
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    #[serde(flatten)]
    pub prompt: PromptDetail,
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct VariablesRequest {
    pub prompt: String,
    #[serde(default)]
    pub variables: Variables,
}

#[derive(Debug, Serialize)]
pub struct VariablesResponse {
    pub names: Vec<String>,
    pub variables: Variables,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn prompt_vectors(history: &[PromptDetail]) -> Vec<PromptVector> {
    history
        .iter()
        .map(|d| PromptVector {
            prompt_id: d.prompt.id,
            created_at: d.prompt.created_at,
            vector: d.primary_vector().map(<[f64]>::to_vec),
        })
        .collect()
}

fn history_response(history: Vec<PromptDetail>, report: DriftReport) -> HistoryResponse {
    let trend = trend_series(&report.prompts);
    let prompts = history
        .into_iter()
        .zip(report.prompts)
        .map(|(prompt, annotated)| HistoryEntry {
            hash: stored_prompt_hash(&prompt.prompt.template, &prompt.prompt.variables),
            prompt,
            previous_similarity: annotated.previous_similarity,
            next_similarity: annotated.next_similarity,
            previous_deviation: annotated.previous_deviation,
            next_deviation: annotated.next_deviation,
        })
        .collect();

    HistoryResponse {
        prompts,
        warnings: report.warnings,
        trend,
    }
}

/// Annotates the window `[previous?, current, next?]` and returns the view for `current`.
fn neighbour_drift(
    previous: Option<PromptDetail>,
    current: PromptDetail,
    next: Option<PromptDetail>,
    n: usize,
    limits: DriftLimits,
) -> Result<PromptDriftView, DriftError> {
    let current_index = usize::from(previous.is_some());
    let window: Vec<PromptDetail> = previous
        .into_iter()
        .chain(std::iter::once(current))
        .chain(next)
        .collect();
    let report = annotate_history(&prompt_vectors(&window), n, limits)?;
    Ok(prompt_drift_view(&report.prompts[current_index]))
}

/// Rejects a history window larger than the analyzer would accept, before loading it.
fn check_history_limit(limit: i64, limits: DriftLimits) -> Result<(), AppError> {
    if limit <= 0 {
        return Err(AppError::Validation("limit must be positive".to_string()));
    }
    if limit as u64 > limits.max_records as u64 {
        return Err(DriftError::ResourceLimit {
            what: "history limit",
            actual: usize::try_from(limit).unwrap_or(usize::MAX),
            limit: limits.max_records,
        }
        .into());
    }
    Ok(())
}

fn resolve_deviation_count(state: &AppState, requested: Option<usize>) -> usize {
    requested.unwrap_or(state.config.deviation_count)
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/models
pub async fn handle_list_models(
    State(state): State<AppState>,
) -> Result<Json<ModelsByCategory>, AppError> {
    let window = Duration::days(state.config.model_cache_days);
    let models = models_by_category(&state.db, state.llm.as_ref(), window).await?;
    Ok(Json(models))
}

/// GET /api/v1/projects
pub async fn handle_list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectRow>>, AppError> {
    Ok(Json(list_projects(&state.db).await?))
}

/// POST /api/v1/projects
pub async fn handle_create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectRow>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    let project = create_project(
        &state.db,
        request.name.trim(),
        request.description.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/v1/projects/:id
pub async fn handle_get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectDetail>, AppError> {
    project_by_id(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Project {id} not found")))
}

/// GET /api/v1/history
///
/// Prompt history in ascending creation order, annotated with neighbour drift.
pub async fn handle_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = params.limit.unwrap_or(state.config.history_limit);
    check_history_limit(limit, state.config.drift_limits)?;
    let n = resolve_deviation_count(&state, params.deviation_count);

    let history = prompt_history(&state.db, params.project_id, limit).await?;
    let report = annotate_history(&prompt_vectors(&history), n, state.config.drift_limits)?;
    Ok(Json(history_response(history, report)))
}

/// GET /api/v1/prompts/:id
pub async fn handle_get_prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PromptResponse>, AppError> {
    let prompt = prompt_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Prompt {id} not found")))?;
    let hash = stored_prompt_hash(&prompt.prompt.template, &prompt.prompt.variables);
    Ok(Json(PromptResponse { prompt, hash }))
}

/// GET /api/v1/prompts/:id/drift
///
/// Neighbour comparison for one prompt within its project's history, shaped for display.
pub async fn handle_prompt_drift(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<DriftQuery>,
) -> Result<Json<PromptDriftView>, AppError> {
    let prompt = prompt_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Prompt {id} not found")))?;
    let n = resolve_deviation_count(&state, params.deviation_count);

    let (previous, next) = prompt_neighbours(&state.db, &prompt.prompt).await?;
    let view = neighbour_drift(previous, prompt, next, n, state.config.drift_limits)?;
    Ok(Json(view))
}

/// POST /api/v1/variables
pub async fn handle_reconcile_variables(
    Json(request): Json<VariablesRequest>,
) -> Json<VariablesResponse> {
    Json(VariablesResponse {
        names: extract_variables(&request.prompt),
        variables: reconcile_variables(&request.prompt, &request.variables),
    })
}

/// POST /api/v1/embeddings
pub async fn handle_embedding(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<EmbeddingResponse>, AppError> {
    Ok(Json(submit_embedding(&state, request).await?))
}

/// POST /api/v1/generations
pub async fn handle_generation(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<GenerationResponse>, AppError> {
    Ok(Json(submit_generation(&state, request).await?))
}

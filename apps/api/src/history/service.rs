//! Prompt submission: embedding and generation requests.
//!
//! Both flows persist the prompt first, render its `{variable}` placeholders,
//! call the provider and persist the result. An embedding request for a
//! template + variables pair already embedded in the project is answered from
//! history without a provider call.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::model_by_id;
use crate::errors::AppError;
use crate::history::store::{
    project_exists, prompts_with_template, store_embedding, store_generation, store_prompt,
};
use crate::models::model::{ModelCategory, ModelRow};
use crate::models::prompt::{EmbeddingRow, GenerationRow, PromptDetail, PromptRow};
use crate::prompting::{prompt_hash, render_template, stored_prompt_hash, Variables};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub prompt: String,
    #[serde(default)]
    pub variables: Variables,
    pub model_id: Uuid,
    pub project_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingResponse {
    pub prompt: PromptRow,
    pub embedding: EmbeddingRow,
    pub hash: String,
    /// True when the embedding came from history instead of the provider.
    pub reused: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub prompt: PromptRow,
    pub generation: GenerationRow,
    pub hash: String,
}

fn validate(request: &SubmitRequest) -> Result<(), AppError> {
    if request.prompt.trim().is_empty() {
        return Err(AppError::Validation("prompt cannot be empty".to_string()));
    }
    Ok(())
}

async fn require_project(state: &AppState, project_id: Uuid) -> Result<(), AppError> {
    if project_exists(&state.db, project_id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("Project {project_id} not found")))
    }
}

async fn require_model(
    state: &AppState,
    model_id: Uuid,
    accepts: impl Fn(ModelCategory) -> bool,
    expected: &str,
) -> Result<ModelRow, AppError> {
    match model_by_id(&state.db, model_id).await? {
        Some(model) if accepts(model.category()) => Ok(model),
        _ => Err(AppError::Validation(format!("Invalid {expected} model"))),
    }
}

/// First entry of `candidates` (newest first) with the same hash that already
/// carries an embedding.
pub fn find_reusable(
    candidates: Vec<PromptDetail>,
    hash: &str,
) -> Option<(PromptRow, EmbeddingRow)> {
    candidates
        .into_iter()
        .filter(|d| stored_prompt_hash(&d.prompt.template, &d.prompt.variables) == hash)
        .find_map(|d| {
            let embedding = d
                .embeddings
                .into_iter()
                .map(|e| e.embedding)
                .find(|e| !e.vector.is_empty())?;
            Some((d.prompt, embedding))
        })
}

pub async fn submit_embedding(
    state: &AppState,
    request: SubmitRequest,
) -> Result<EmbeddingResponse, AppError> {
    validate(&request)?;
    require_project(state, request.project_id).await?;
    let model = require_model(
        state,
        request.model_id,
        |c| c == ModelCategory::Embedding,
        "embedding",
    )
    .await?;

    let hash = prompt_hash(&request.prompt, &request.variables);
    let candidates = prompts_with_template(
        &state.db,
        request.project_id,
        &request.prompt,
        state.config.drift_limits.max_records as i64,
    )
    .await?;
    if let Some((prompt, embedding)) = find_reusable(candidates, &hash) {
        debug!("Reusing embedding {} for prompt {}", embedding.id, prompt.id);
        return Ok(EmbeddingResponse {
            prompt,
            embedding,
            hash,
            reused: true,
        });
    }

    let prompt = store_prompt(
        &state.db,
        &request.prompt,
        &request.variables,
        model.id,
        request.project_id,
    )
    .await?;

    let rendered = render_template(&request.prompt, &request.variables);
    let vector = state.llm.embed(&model.name, &rendered).await?;
    let embedding = store_embedding(&state.db, prompt.id, model.id, &vector).await?;

    info!(
        "Embedded prompt {} with {} ({} dimensions)",
        prompt.id,
        model.name,
        vector.len()
    );
    Ok(EmbeddingResponse {
        prompt,
        embedding,
        hash,
        reused: false,
    })
}

pub async fn submit_generation(
    state: &AppState,
    request: SubmitRequest,
) -> Result<GenerationResponse, AppError> {
    validate(&request)?;
    require_project(state, request.project_id).await?;
    let model = require_model(
        state,
        request.model_id,
        |c| c.is_generative(),
        "chat or reasoning",
    )
    .await?;

    let prompt = store_prompt(
        &state.db,
        &request.prompt,
        &request.variables,
        model.id,
        request.project_id,
    )
    .await?;

    let rendered = render_template(&request.prompt, &request.variables);
    let completion = state.llm.complete(&model.name, &rendered).await?;
    let generation = store_generation(
        &state.db,
        prompt.id,
        model.id,
        &completion.text,
        &completion.metadata(),
    )
    .await?;

    info!("Generated output for prompt {} with {}", prompt.id, model.name);
    Ok(GenerationResponse {
        hash: prompt_hash(&request.prompt, &request.variables),
        prompt,
        generation,
    })
}

//! Persistence for projects, prompts, embeddings and generations.
//! Prompts are written once; embeddings and generations are appended later.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::model::ModelRow;
use crate::models::project::ProjectRow;
use crate::models::prompt::{
    EmbeddingRow, EmbeddingWithModel, GenerationRow, GenerationWithModel, PromptDetail, PromptRow,
};
use crate::prompting::Variables;

// History order is `(created_at, id)` everywhere so equal timestamps never swap
// neighbours between calls.
const PROJECT_PROMPTS_QUERY: &str =
    "SELECT * FROM promptr_prompts WHERE project_id = $1 ORDER BY created_at ASC, id ASC";

const HISTORY_QUERY: &str = r#"
    SELECT * FROM promptr_prompts
    WHERE ($1::uuid IS NULL OR project_id = $1)
    ORDER BY created_at ASC, id ASC
    LIMIT $2
"#;

const PREVIOUS_PROMPT_QUERY: &str = r#"
    SELECT * FROM promptr_prompts
    WHERE project_id = $1 AND (created_at, id) < ($2, $3)
    ORDER BY created_at DESC, id DESC
    LIMIT 1
"#;

const NEXT_PROMPT_QUERY: &str = r#"
    SELECT * FROM promptr_prompts
    WHERE project_id = $1 AND (created_at, id) > ($2, $3)
    ORDER BY created_at ASC, id ASC
    LIMIT 1
"#;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: ProjectRow,
    pub prompts: Vec<PromptDetail>,
}

pub async fn create_project(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
) -> Result<ProjectRow> {
    let project = sqlx::query_as::<_, ProjectRow>(
        r#"
        INSERT INTO promptr_projects (name, description, created_at, updated_at)
        VALUES ($1, $2, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await?;

    info!("Created project {} ({})", project.name, project.id);
    Ok(project)
}

pub async fn project_exists(pool: &PgPool, id: Uuid) -> Result<bool> {
    Ok(sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM promptr_projects WHERE id = $1)",
    )
    .bind(id)
    .fetch_one(pool)
    .await?)
}

/// Newest first.
pub async fn list_projects(pool: &PgPool) -> Result<Vec<ProjectRow>> {
    Ok(sqlx::query_as::<_, ProjectRow>(
        "SELECT * FROM promptr_projects ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn project_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ProjectDetail>> {
    let project = sqlx::query_as::<_, ProjectRow>("SELECT * FROM promptr_projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    let Some(project) = project else {
        return Ok(None);
    };

    let prompts = sqlx::query_as::<_, PromptRow>(PROJECT_PROMPTS_QUERY)
        .bind(id)
        .fetch_all(pool)
        .await?;
    let prompts = attach_relations(pool, prompts).await?;

    Ok(Some(ProjectDetail { project, prompts }))
}

pub async fn store_prompt(
    pool: &PgPool,
    template: &str,
    variables: &Variables,
    target_model_id: Uuid,
    project_id: Uuid,
) -> Result<PromptRow> {
    let prompt = sqlx::query_as::<_, PromptRow>(
        r#"
        INSERT INTO promptr_prompts
            (template, variables, target_model_id, project_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(template)
    .bind(serde_json::to_value(variables)?)
    .bind(target_model_id)
    .bind(project_id)
    .fetch_one(pool)
    .await?;

    info!("Stored prompt {} in project {project_id}", prompt.id);
    Ok(prompt)
}

pub async fn store_embedding(
    pool: &PgPool,
    prompt_id: Uuid,
    model_id: Uuid,
    vector: &[f64],
) -> Result<EmbeddingRow> {
    Ok(sqlx::query_as::<_, EmbeddingRow>(
        r#"
        INSERT INTO promptr_embeddings (prompt_id, model_id, vector, created_at)
        VALUES ($1, $2, $3, NOW())
        RETURNING *
        "#,
    )
    .bind(prompt_id)
    .bind(model_id)
    .bind(vector)
    .fetch_one(pool)
    .await?)
}

pub async fn store_generation(
    pool: &PgPool,
    prompt_id: Uuid,
    model_id: Uuid,
    output: &str,
    metadata: &Value,
) -> Result<GenerationRow> {
    Ok(sqlx::query_as::<_, GenerationRow>(
        r#"
        INSERT INTO promptr_generations (prompt_id, model_id, output, metadata, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        RETURNING *
        "#,
    )
    .bind(prompt_id)
    .bind(model_id)
    .bind(output)
    .bind(metadata)
    .fetch_one(pool)
    .await?)
}

/// Prompts in ascending creation order, optionally scoped to one project.
pub async fn prompt_history(
    pool: &PgPool,
    project_id: Option<Uuid>,
    limit: i64,
) -> Result<Vec<PromptDetail>> {
    let prompts = sqlx::query_as::<_, PromptRow>(HISTORY_QUERY)
        .bind(project_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    attach_relations(pool, prompts).await
}

/// Prompts in a project with exactly this template, newest first.
pub async fn prompts_with_template(
    pool: &PgPool,
    project_id: Uuid,
    template: &str,
    limit: i64,
) -> Result<Vec<PromptDetail>> {
    let prompts = sqlx::query_as::<_, PromptRow>(
        r#"
        SELECT * FROM promptr_prompts
        WHERE project_id = $1 AND template = $2
        ORDER BY created_at DESC, id DESC
        LIMIT $3
        "#,
    )
    .bind(project_id)
    .bind(template)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    attach_relations(pool, prompts).await
}

/// The prompts immediately before and after `prompt` in its project's history,
/// using the same `(created_at, id)` order as [`prompt_history`].
pub async fn prompt_neighbours(
    pool: &PgPool,
    prompt: &PromptRow,
) -> Result<(Option<PromptDetail>, Option<PromptDetail>)> {
    let previous = sqlx::query_as::<_, PromptRow>(PREVIOUS_PROMPT_QUERY)
        .bind(prompt.project_id)
        .bind(prompt.created_at)
        .bind(prompt.id)
        .fetch_optional(pool)
        .await?;

    let next = sqlx::query_as::<_, PromptRow>(NEXT_PROMPT_QUERY)
        .bind(prompt.project_id)
        .bind(prompt.created_at)
        .bind(prompt.id)
        .fetch_optional(pool)
        .await?;

    let mut previous = attach_relations(pool, previous.into_iter().collect()).await?;
    let mut next = attach_relations(pool, next.into_iter().collect()).await?;
    Ok((previous.pop(), next.pop()))
}

pub async fn prompt_by_id(pool: &PgPool, id: Uuid) -> Result<Option<PromptDetail>> {
    let prompt = sqlx::query_as::<_, PromptRow>("SELECT * FROM promptr_prompts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match prompt {
        Some(prompt) => Ok(attach_relations(pool, vec![prompt]).await?.pop()),
        None => Ok(None),
    }
}

/// Loads embeddings, generations and their models for `prompts`, preserving order.
async fn attach_relations(pool: &PgPool, prompts: Vec<PromptRow>) -> Result<Vec<PromptDetail>> {
    if prompts.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = prompts.iter().map(|p| p.id).collect();

    let embeddings = sqlx::query_as::<_, EmbeddingRow>(
        "SELECT * FROM promptr_embeddings WHERE prompt_id = ANY($1) ORDER BY created_at ASC, id ASC",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let generations = sqlx::query_as::<_, GenerationRow>(
        "SELECT * FROM promptr_generations WHERE prompt_id = ANY($1) ORDER BY created_at ASC, id ASC",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut model_ids: Vec<Uuid> = embeddings
        .iter()
        .map(|e| e.model_id)
        .chain(generations.iter().map(|g| g.model_id))
        .collect();
    model_ids.sort_unstable();
    model_ids.dedup();

    let models: HashMap<Uuid, ModelRow> =
        sqlx::query_as::<_, ModelRow>("SELECT * FROM promptr_models WHERE id = ANY($1)")
            .bind(&model_ids)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

    Ok(group_relations(prompts, embeddings, generations, &models))
}

fn group_relations(
    prompts: Vec<PromptRow>,
    embeddings: Vec<EmbeddingRow>,
    generations: Vec<GenerationRow>,
    models: &HashMap<Uuid, ModelRow>,
) -> Vec<PromptDetail> {
    let mut embeddings_by_prompt: HashMap<Uuid, Vec<EmbeddingWithModel>> = HashMap::new();
    for embedding in embeddings {
        let model = models.get(&embedding.model_id).cloned();
        embeddings_by_prompt
            .entry(embedding.prompt_id)
            .or_default()
            .push(EmbeddingWithModel { embedding, model });
    }

    let mut generations_by_prompt: HashMap<Uuid, Vec<GenerationWithModel>> = HashMap::new();
    for generation in generations {
        let model = models.get(&generation.model_id).cloned();
        generations_by_prompt
            .entry(generation.prompt_id)
            .or_default()
            .push(GenerationWithModel { generation, model });
    }

    prompts
        .into_iter()
        .map(|prompt| PromptDetail {
            embeddings: embeddings_by_prompt.remove(&prompt.id).unwrap_or_default(),
            generations: generations_by_prompt.remove(&prompt.id).unwrap_or_default(),
            prompt,
        })
        .collect()
}

//! Model catalog: the provider's model list, categorised and cached in the
//! `promptr_models` table. Rows refreshed within the cache window are served
//! from the database; otherwise the provider is queried and rows are upserted.

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::llm_client::LlmProvider;
use crate::models::model::{ModelCategory, ModelRow};

/// Derives a category from a provider model id.
pub fn categorize(model_id: &str) -> ModelCategory {
    if model_id.starts_with("gpt") {
        ModelCategory::Chat
    } else if model_id.starts_with('o') {
        ModelCategory::Reasoning
    } else if model_id.starts_with("text-embedding") {
        ModelCategory::Embedding
    } else {
        ModelCategory::Other
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsByCategory {
    pub chat: Vec<ModelRow>,
    pub embedding: Vec<ModelRow>,
    pub reasoning: Vec<ModelRow>,
}

impl ModelsByCategory {
    pub fn from_rows(rows: Vec<ModelRow>) -> Self {
        let mut grouped = Self {
            chat: Vec::new(),
            embedding: Vec::new(),
            reasoning: Vec::new(),
        };
        for row in rows {
            match row.category() {
                ModelCategory::Chat => grouped.chat.push(row),
                ModelCategory::Embedding => grouped.embedding.push(row),
                ModelCategory::Reasoning => grouped.reasoning.push(row),
                ModelCategory::Other => {}
            }
        }
        grouped
    }
}

async fn fetch_and_store(pool: &PgPool, llm: &dyn LlmProvider) -> Result<Vec<ModelRow>> {
    let remote = llm.list_models().await?;
    info!("Refreshing model catalog with {} models", remote.len());

    let mut stored = Vec::with_capacity(remote.len());
    for model in remote {
        let category = categorize(&model.id);
        let row = sqlx::query_as::<_, ModelRow>(
            r#"
            INSERT INTO promptr_models (name, provider, category, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (name, provider)
            DO UPDATE SET category = EXCLUDED.category, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&model.id)
        .bind(llm.provider())
        .bind(category.as_str())
        .fetch_one(pool)
        .await?;
        stored.push(row);
    }
    Ok(stored)
}

/// All catalogued models for the provider, refreshing when the cache is stale.
pub async fn available_models(
    pool: &PgPool,
    llm: &dyn LlmProvider,
    cache_window: Duration,
) -> Result<Vec<ModelRow>> {
    let fresh_since = Utc::now() - cache_window;
    let cached = sqlx::query_as::<_, ModelRow>(
        "SELECT * FROM promptr_models WHERE provider = $1 AND updated_at >= $2 ORDER BY name",
    )
    .bind(llm.provider())
    .bind(fresh_since)
    .fetch_all(pool)
    .await?;

    if !cached.is_empty() {
        return Ok(cached);
    }
    fetch_and_store(pool, llm).await
}

pub async fn models_by_category(
    pool: &PgPool,
    llm: &dyn LlmProvider,
    cache_window: Duration,
) -> Result<ModelsByCategory> {
    let all = available_models(pool, llm, cache_window).await?;
    Ok(ModelsByCategory::from_rows(all))
}

pub async fn model_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ModelRow>> {
    Ok(
        sqlx::query_as::<_, ModelRow>("SELECT * FROM promptr_models WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str) -> ModelRow {
        ModelRow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            provider: "openai".to_string(),
            category: categorize(name).as_str().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_categorize_prefixes() {
        assert_eq!(categorize("gpt-4o-mini"), ModelCategory::Chat);
        assert_eq!(categorize("o3-mini"), ModelCategory::Reasoning);
        assert_eq!(categorize("omni-moderation-latest"), ModelCategory::Reasoning);
        assert_eq!(categorize("text-embedding-3-small"), ModelCategory::Embedding);
        assert_eq!(categorize("dall-e-3"), ModelCategory::Other);
        assert_eq!(categorize("whisper-1"), ModelCategory::Other);
    }

    #[test]
    fn test_grouping_drops_other() {
        let grouped = ModelsByCategory::from_rows(vec![
            row("gpt-4o"),
            row("o1"),
            row("text-embedding-3-large"),
            row("tts-1"),
        ]);
        assert_eq!(grouped.chat.len(), 1);
        assert_eq!(grouped.reasoning.len(), 1);
        assert_eq!(grouped.embedding.len(), 1);
        assert_eq!(grouped.embedding[0].name, "text-embedding-3-large");
    }
}

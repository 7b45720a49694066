use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::model::ModelRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromptRow {
    pub id: Uuid,
    pub template: String,
    pub variables: Value,
    pub target_model_id: Uuid,
    pub project_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmbeddingRow {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub model_id: Uuid,
    pub vector: Vec<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenerationRow {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub model_id: Uuid,
    pub output: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingWithModel {
    #[serde(flatten)]
    pub embedding: EmbeddingRow,
    pub model: Option<ModelRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationWithModel {
    #[serde(flatten)]
    pub generation: GenerationRow,
    pub model: Option<ModelRow>,
}

/// A prompt with its embeddings and generations, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct PromptDetail {
    #[serde(flatten)]
    pub prompt: PromptRow,
    pub embeddings: Vec<EmbeddingWithModel>,
    pub generations: Vec<GenerationWithModel>,
}

impl PromptDetail {
    /// The vector the drift analysis uses: the first stored embedding.
    pub fn primary_vector(&self) -> Option<&[f64]> {
        self.embeddings
            .first()
            .map(|e| e.embedding.vector.as_slice())
    }
}

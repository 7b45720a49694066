use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelCategory {
    Chat,
    Embedding,
    Reasoning,
    Other,
}

impl ModelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelCategory::Chat => "chat",
            ModelCategory::Embedding => "embedding",
            ModelCategory::Reasoning => "reasoning",
            ModelCategory::Other => "other",
        }
    }

    /// Chat and reasoning models can both produce generations.
    pub fn is_generative(&self) -> bool {
        matches!(self, ModelCategory::Chat | ModelCategory::Reasoning)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModelRow {
    pub id: Uuid,
    pub name: String,
    pub provider: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelRow {
    pub fn category(&self) -> ModelCategory {
        match self.category.as_str() {
            "chat" => ModelCategory::Chat,
            "embedding" => ModelCategory::Embedding,
            "reasoning" => ModelCategory::Reasoning,
            _ => ModelCategory::Other,
        }
    }
}

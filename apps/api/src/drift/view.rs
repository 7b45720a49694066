//! Chart and table shapes derived from an annotated history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::drift::analyzer::{AnnotatedPrompt, Deviation};

pub const NOT_AVAILABLE: &str = "not available";

/// One point of the successor-similarity trend line.
/// `similarity` is 0.0 when `available` is false so the series stays plottable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub prompt_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub similarity: f64,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationRow {
    pub index: usize,
    pub magnitude: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeviationTable {
    Rows(Vec<DeviationRow>),
    NotAvailable(&'static str),
}

/// Neighbour comparison for a single selected prompt.
#[derive(Debug, Clone, Serialize)]
pub struct PromptDriftView {
    pub previous_similarity: String,
    pub previous_deviation: DeviationTable,
    pub next_similarity: String,
    pub next_deviation: DeviationTable,
}

pub fn trend_series(prompts: &[AnnotatedPrompt]) -> Vec<TrendPoint> {
    prompts
        .iter()
        .map(|p| TrendPoint {
            prompt_id: p.record.prompt_id,
            created_at: p.record.created_at,
            similarity: p.next_similarity.unwrap_or(0.0),
            available: p.next_similarity.is_some(),
        })
        .collect()
}

pub fn deviation_table(deviations: Option<&[Deviation]>) -> DeviationTable {
    match deviations {
        Some(rows) => DeviationTable::Rows(
            rows.iter()
                .map(|d| DeviationRow {
                    index: d.index,
                    magnitude: format!("{:.8}", d.magnitude),
                })
                .collect(),
        ),
        None => DeviationTable::NotAvailable(NOT_AVAILABLE),
    }
}

fn similarity_cell(similarity: Option<f64>) -> String {
    similarity
        .map(|s| s.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn prompt_drift_view(prompt: &AnnotatedPrompt) -> PromptDriftView {
    PromptDriftView {
        previous_similarity: similarity_cell(prompt.previous_similarity),
        previous_deviation: deviation_table(prompt.previous_deviation.as_deref()),
        next_similarity: similarity_cell(prompt.next_similarity),
        next_deviation: deviation_table(prompt.next_deviation.as_deref()),
    }
}

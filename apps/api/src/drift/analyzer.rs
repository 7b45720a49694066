//! Embedding Drift Analyzer.
//!
//! For an ordered prompt history (ascending creation time) computes, between each
//! record and its immediate neighbours, the cosine similarity of their embeddings
//! and the dimensions with the largest absolute deviation.
//!
//! "Previous" and "next" are defined by sequence position only. A pair that cannot
//! be compared (missing vector, mismatched dimensions, zero magnitude) leaves the
//! derived fields absent and, when the failure is a data error, records a
//! [`PairWarning`] instead of failing the whole batch.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftError {
    #[error("vector dimensions differ: {left} != {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("requested {requested} deviations but vectors only have {len} dimensions")]
    InvalidDeviationCount { requested: usize, len: usize },

    #[error("cosine similarity is undefined for a zero-magnitude vector")]
    UndefinedSimilarity,

    #[error("{what} exceeds limit: {actual} > {limit}")]
    ResourceLimit {
        what: &'static str,
        actual: usize,
        limit: usize,
    },
}

/// One ranked dimension: `(|a[i] - b[i]|, i)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub magnitude: f64,
    pub index: usize,
}

/// Analyzer input. `vector` is the first embedding stored for the prompt, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVector {
    pub prompt_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub vector: Option<Vec<f64>>,
}

/// Analyzer output: the input record plus derived neighbour fields.
/// `None` means "not computed", never zero drift.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedPrompt {
    #[serde(flatten)]
    pub record: PromptVector,
    pub previous_similarity: Option<f64>,
    pub next_similarity: Option<f64>,
    pub previous_deviation: Option<Vec<Deviation>>,
    pub next_deviation: Option<Vec<Deviation>>,
}

/// A pair of adjacent records whose comparison failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairWarning {
    pub earlier_index: usize,
    pub later_index: usize,
    pub error: DriftError,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub prompts: Vec<AnnotatedPrompt>,
    pub warnings: Vec<PairWarning>,
}

/// Per-call bounds on batch size and vector dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftLimits {
    pub max_records: usize,
    pub max_dimensions: usize,
}

impl Default for DriftLimits {
    fn default() -> Self {
        Self {
            max_records: 1_000,
            max_dimensions: 8_192,
        }
    }
}

/// dot(a, b) / (‖a‖₂ · ‖b‖₂).
///
/// Fails with `UndefinedSimilarity` instead of returning NaN or infinity when
/// either vector is all zeros (or the result is otherwise not finite).
/// Components are scaled by each vector's largest magnitude before summing, so
/// very small or very large non-zero vectors neither underflow nor overflow.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, DriftError> {
    if a.len() != b.len() {
        return Err(DriftError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let (scale_a, scale_b) = (max_abs(a), max_abs(b));
    if scale_a == 0.0 || scale_b == 0.0 {
        return Err(DriftError::UndefinedSimilarity);
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x / scale_a, y / scale_b);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !similarity.is_finite() {
        return Err(DriftError::UndefinedSimilarity);
    }
    Ok(similarity)
}

/// Largest component magnitude; 0.0 only when every component is zero.
fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// The `n` dimensions with the largest `|a[i] - b[i]|`, largest first.
///
/// Ties in magnitude are ordered by ascending dimension index, so the result is
/// identical for identical inputs and for swapped arguments.
pub fn top_deviating_dimensions(
    a: &[f64],
    b: &[f64],
    n: usize,
) -> Result<Vec<Deviation>, DriftError> {
    if a.len() != b.len() {
        return Err(DriftError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if n > a.len() {
        return Err(DriftError::InvalidDeviationCount {
            requested: n,
            len: a.len(),
        });
    }

    let mut deviations: Vec<Deviation> = a
        .iter()
        .zip(b)
        .enumerate()
        .map(|(index, (&x, &y))| Deviation {
            magnitude: (x - y).abs(),
            index,
        })
        .collect();

    deviations.sort_by(by_magnitude_then_index);
    deviations.truncate(n);
    Ok(deviations)
}

fn by_magnitude_then_index(left: &Deviation, right: &Deviation) -> Ordering {
    right
        .magnitude
        .total_cmp(&left.magnitude)
        .then_with(|| left.index.cmp(&right.index))
}

struct PairDrift {
    similarity: f64,
    deviation: Vec<Deviation>,
}

fn compare_pair(current: &[f64], other: &[f64], n: usize) -> Result<PairDrift, DriftError> {
    Ok(PairDrift {
        similarity: cosine_similarity(current, other)?,
        deviation: top_deviating_dimensions(current, other, n)?,
    })
}

fn usable_vector(record: &PromptVector) -> Option<&[f64]> {
    record.vector.as_deref().filter(|v| !v.is_empty())
}

/// Annotates every record with its neighbour similarity and deviation.
///
/// Exceeding `limits` is a call-level error. Per-pair failures become absent
/// fields plus a [`PairWarning`] in the returned report.
pub fn annotate_history(
    records: &[PromptVector],
    n: usize,
    limits: DriftLimits,
) -> Result<DriftReport, DriftError> {
    if records.len() > limits.max_records {
        return Err(DriftError::ResourceLimit {
            what: "record count",
            actual: records.len(),
            limit: limits.max_records,
        });
    }
    if let Some(widest) = records.iter().filter_map(usable_vector).map(<[f64]>::len).max() {
        if widest > limits.max_dimensions {
            return Err(DriftError::ResourceLimit {
                what: "vector dimensions",
                actual: widest,
                limit: limits.max_dimensions,
            });
        }
    }

    let mut prompts: Vec<AnnotatedPrompt> = records
        .iter()
        .cloned()
        .map(|record| AnnotatedPrompt {
            record,
            previous_similarity: None,
            next_similarity: None,
            previous_deviation: None,
            next_deviation: None,
        })
        .collect();
    let mut warnings = Vec::new();

    // Both metrics are symmetric, so each adjacent pair is computed once and
    // shared between the two records.
    for (earlier_index, pair) in records.windows(2).enumerate() {
        let later_index = earlier_index + 1;
        let (Some(earlier), Some(later)) = (usable_vector(&pair[0]), usable_vector(&pair[1]))
        else {
            continue;
        };

        match compare_pair(later, earlier, n) {
            Ok(drift) => {
                prompts[earlier_index].next_similarity = Some(drift.similarity);
                prompts[earlier_index].next_deviation = Some(drift.deviation.clone());
                prompts[later_index].previous_similarity = Some(drift.similarity);
                prompts[later_index].previous_deviation = Some(drift.deviation);
            }
            Err(error) => {
                warn!(
                    "Skipping drift between prompts {} and {}: {error}",
                    pair[0].prompt_id, pair[1].prompt_id
                );
                warnings.push(PairWarning {
                    earlier_index,
                    later_index,
                    error,
                });
            }
        }
    }

    Ok(DriftReport { prompts, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TOLERANCE: f64 = 1e-9;

    fn record(minute: u32, vector: Option<Vec<f64>>) -> PromptVector {
        PromptVector {
            prompt_id: Uuid::new_v4(),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap(),
            vector,
        }
    }

    fn sample_vectors() -> Vec<Vec<f64>> {
        vec![
            vec![0.12, -0.5, 3.25, 0.0, 7.5],
            vec![1.0, 1.0, 1.0, 1.0, 1.0],
            vec![-2.0, 0.25, 0.5, 9.0, -0.75],
            vec![0.001, 0.002, -0.003, 0.004, 0.005],
        ]
    }

    #[test]
    fn test_self_similarity_is_one() {
        for v in sample_vectors() {
            let s = cosine_similarity(&v, &v).unwrap();
            assert!((s - 1.0).abs() < TOLERANCE, "similarity was {s}");
        }
    }

    #[test]
    fn test_extreme_magnitudes_stay_defined() {
        for scale in [1e-200, 1e200, f64::MIN_POSITIVE, 1e300] {
            let v = [scale, 2.0 * scale, -0.5 * scale];
            let s = cosine_similarity(&v, &v).unwrap();
            assert!((s - 1.0).abs() < TOLERANCE, "similarity at {scale} was {s}");
        }
        let tiny = [1e-200, 0.0];
        let huge = [0.0, 1e200];
        assert_eq!(cosine_similarity(&tiny, &huge).unwrap(), 0.0);
        let mixed = cosine_similarity(&[1e-200, 1e-200], &[1e200, 1e200]).unwrap();
        assert!((mixed - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let vectors = sample_vectors();
        for a in &vectors {
            for b in &vectors {
                assert_eq!(
                    cosine_similarity(a, b).unwrap(),
                    cosine_similarity(b, a).unwrap()
                );
            }
        }
    }

    #[test]
    fn test_orthogonal_vectors() {
        let a = [1.0, 0.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
        assert_eq!(
            top_deviating_dimensions(&a, &b, 2).unwrap(),
            vec![
                Deviation {
                    magnitude: 1.0,
                    index: 0
                },
                Deviation {
                    magnitude: 1.0,
                    index: 1
                },
            ]
        );
    }

    #[test]
    fn test_parallel_vectors() {
        let a = [2.0, 0.0];
        let b = [1.0, 0.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < TOLERANCE);
        assert_eq!(
            top_deviating_dimensions(&a, &b, 1).unwrap(),
            vec![Deviation {
                magnitude: 1.0,
                index: 0
            }]
        );
    }

    #[test]
    fn test_mismatched_lengths() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 2.0];
        let expected = DriftError::DimensionMismatch { left: 3, right: 2 };
        assert_eq!(cosine_similarity(&a, &b), Err(expected.clone()));
        assert_eq!(top_deviating_dimensions(&a, &b, 1), Err(expected));
    }

    #[test]
    fn test_deviation_count_larger_than_vector() {
        let a = [1.0, 2.0];
        let b = [2.0, 1.0];
        assert_eq!(
            top_deviating_dimensions(&a, &b, 3),
            Err(DriftError::InvalidDeviationCount {
                requested: 3,
                len: 2
            })
        );
    }

    #[test]
    fn test_zero_vector_is_undefined() {
        let zero = [0.0, 0.0, 0.0];
        let other = [1.0, 2.0, 3.0];
        assert_eq!(
            cosine_similarity(&zero, &other),
            Err(DriftError::UndefinedSimilarity)
        );
        assert_eq!(
            cosine_similarity(&other, &zero),
            Err(DriftError::UndefinedSimilarity)
        );
    }

    #[test]
    fn test_deviations_sorted_unique_and_sized() {
        let vectors = sample_vectors();
        for a in &vectors {
            for b in &vectors {
                for n in 0..=a.len() {
                    let top = top_deviating_dimensions(a, b, n).unwrap();
                    assert_eq!(top.len(), n);
                    assert!(top.windows(2).all(|w| w[0].magnitude >= w[1].magnitude));
                    let mut indices: Vec<usize> = top.iter().map(|d| d.index).collect();
                    indices.sort_unstable();
                    indices.dedup();
                    assert_eq!(indices.len(), n);
                    assert!(indices.iter().all(|&i| i < a.len()));
                }
            }
        }
    }

    #[test]
    fn test_deviation_ignores_argument_order() {
        let vectors = sample_vectors();
        assert_eq!(
            top_deviating_dimensions(&vectors[0], &vectors[2], 4).unwrap(),
            top_deviating_dimensions(&vectors[2], &vectors[0], 4).unwrap()
        );
    }

    #[test]
    fn test_ties_break_by_ascending_index_and_are_repeatable() {
        let a = [0.0, 3.0, 1.0, 0.0, 3.0, 1.0];
        let b = [1.0, 0.0, 0.0, -1.0, 0.0, 2.0];
        let first = top_deviating_dimensions(&a, &b, 6).unwrap();
        let indices: Vec<usize> = first.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![1, 4, 0, 2, 3, 5]);
        for _ in 0..20 {
            assert_eq!(top_deviating_dimensions(&a, &b, 6).unwrap(), first);
        }
    }

    #[test]
    fn test_single_record_has_no_neighbours() {
        let records = vec![record(0, Some(vec![1.0, 0.0]))];
        let report = annotate_history(&records, 1, DriftLimits::default()).unwrap();
        assert_eq!(report.prompts.len(), 1);
        let only = &report.prompts[0];
        assert!(only.previous_similarity.is_none());
        assert!(only.next_similarity.is_none());
        assert!(only.previous_deviation.is_none());
        assert!(only.next_deviation.is_none());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_missing_middle_vector_blanks_both_pairs() {
        let records = vec![
            record(0, Some(vec![1.0, 0.0])),
            record(1, None),
            record(2, Some(vec![0.0, 1.0])),
        ];
        let report = annotate_history(&records, 2, DriftLimits::default()).unwrap();
        let p = &report.prompts;
        assert!(p[0].next_similarity.is_none());
        assert!(p[2].previous_similarity.is_none());
        assert!(p[1].previous_similarity.is_none());
        assert!(p[1].next_similarity.is_none());
        assert!(p[1].previous_deviation.is_none());
        assert!(p[1].next_deviation.is_none());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_empty_vector_counts_as_absent() {
        let records = vec![record(0, Some(vec![1.0, 0.0])), record(1, Some(vec![]))];
        let report = annotate_history(&records, 1, DriftLimits::default()).unwrap();
        assert!(report.prompts[0].next_similarity.is_none());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_neighbours_are_filled_and_order_preserved() {
        let records = vec![
            record(0, Some(vec![1.0, 0.0, 0.0])),
            record(1, Some(vec![1.0, 1.0, 0.0])),
            record(2, Some(vec![1.0, 1.0, 0.0])),
        ];
        let report = annotate_history(&records, 2, DriftLimits::default()).unwrap();
        let ids: Vec<Uuid> = report.prompts.iter().map(|p| p.record.prompt_id).collect();
        let expected_ids: Vec<Uuid> = records.iter().map(|r| r.prompt_id).collect();
        assert_eq!(ids, expected_ids);

        let p = &report.prompts;
        let first_pair = 1.0 / 2.0_f64.sqrt();
        assert!((p[0].next_similarity.unwrap() - first_pair).abs() < TOLERANCE);
        assert_eq!(p[0].next_similarity, p[1].previous_similarity);
        assert_eq!(p[0].next_deviation, p[1].previous_deviation);
        assert!((p[1].next_similarity.unwrap() - 1.0).abs() < TOLERANCE);
        assert!(p[0].previous_similarity.is_none());
        assert!(p[2].next_similarity.is_none());
        assert_eq!(
            p[1].next_deviation.as_deref(),
            Some(
                &[
                    Deviation {
                        magnitude: 0.0,
                        index: 0
                    },
                    Deviation {
                        magnitude: 0.0,
                        index: 1
                    },
                ][..]
            )
        );
    }

    #[test]
    fn test_mismatch_is_a_warning_not_a_failure() {
        let records = vec![
            record(0, Some(vec![1.0, 0.0])),
            record(1, Some(vec![1.0, 0.0, 0.0])),
            record(2, Some(vec![0.0, 1.0, 0.0])),
        ];
        let report = annotate_history(&records, 1, DriftLimits::default()).unwrap();
        assert_eq!(
            report.warnings,
            vec![PairWarning {
                earlier_index: 0,
                later_index: 1,
                error: DriftError::DimensionMismatch { left: 3, right: 2 },
            }]
        );
        let p = &report.prompts;
        assert!(p[0].next_similarity.is_none());
        assert!(p[1].previous_similarity.is_none());
        assert!(p[1].previous_deviation.is_none());
        assert_eq!(p[1].next_similarity, Some(0.0));
        assert_eq!(p[2].previous_similarity, Some(0.0));
    }

    #[test]
    fn test_zero_vector_pair_is_a_warning() {
        let records = vec![record(0, Some(vec![0.0, 0.0])), record(1, Some(vec![1.0, 0.0]))];
        let report = annotate_history(&records, 1, DriftLimits::default()).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].error, DriftError::UndefinedSimilarity);
        assert!(report.prompts[0].next_deviation.is_none());
    }

    #[test]
    fn test_deviation_count_too_large_is_a_pair_warning() {
        let records = vec![record(0, Some(vec![1.0, 0.0])), record(1, Some(vec![0.0, 1.0]))];
        let report = annotate_history(&records, 5, DriftLimits::default()).unwrap();
        assert!(matches!(
            report.warnings[0].error,
            DriftError::InvalidDeviationCount { requested: 5, len: 2 }
        ));
    }

    #[test]
    fn test_limits_are_fatal() {
        let limits = DriftLimits {
            max_records: 2,
            max_dimensions: 2,
        };
        let too_many = vec![record(0, None), record(1, None), record(2, None)];
        assert!(matches!(
            annotate_history(&too_many, 1, limits),
            Err(DriftError::ResourceLimit { actual: 3, limit: 2, .. })
        ));

        let too_wide = vec![record(0, Some(vec![1.0, 2.0, 3.0]))];
        assert!(matches!(
            annotate_history(&too_wide, 1, limits),
            Err(DriftError::ResourceLimit { actual: 3, limit: 2, .. })
        ));
    }

    #[test]
    fn test_empty_history() {
        let report = annotate_history(&[], 5, DriftLimits::default()).unwrap();
        assert!(report.prompts.is_empty());
        assert!(report.warnings.is_empty());
    }
}

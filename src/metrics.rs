//! Metric adapter contract and built-in metrics.
//!
//! A metric is a black box `score(sources, hypotheses, references)` that
//! returns a system-level score and, for segment-level metrics, one score per
//! segment. Capability flags tell the bootstrap engine which resampling
//! strategy is valid for the metric.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised at the metric boundary
#[derive(Error, Debug)]
pub enum MetricError {
    #[error("{metric} does not support language '{language}'")]
    UnsupportedLanguage { metric: String, language: String },

    #[error("{metric} cannot score an empty corpus")]
    EmptyCorpus { metric: String },

    #[error("{metric}: {field} has {actual} entries, expected {expected}")]
    SegmentCountMismatch {
        metric: String,
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{metric} failed: {message}")]
    Invocation { metric: String, message: String },

    #[error("{metric} timed out after {seconds}s")]
    Timeout { metric: String, seconds: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Scores produced by one metric for one system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// Metric that produced the scores
    pub metric: String,
    /// Aggregate score over the whole corpus
    pub system_score: f64,
    /// Per-segment scores, when the metric produces them
    pub segment_scores: Option<Vec<f64>>,
    /// Source segments the scores were computed over
    pub sources: Vec<String>,
    /// Scored hypotheses
    pub hypotheses: Vec<String>,
    /// Reference segments
    pub references: Vec<String>,
}

impl MetricResult {
    /// Build a result, checking that every sequence has the same length
    ///
    /// # Errors
    ///
    /// Returns `SegmentCountMismatch` if the references, sources or segment
    /// scores disagree with the number of hypotheses.
    pub fn new(
        metric: impl Into<String>,
        system_score: f64,
        segment_scores: Option<Vec<f64>>,
        sources: &[String],
        hypotheses: &[String],
        references: &[String],
    ) -> Result<Self, MetricError> {
        let metric = metric.into();
        let expected = hypotheses.len();

        let mut checks = vec![("sources", sources.len()), ("references", references.len())];
        if let Some(scores) = &segment_scores {
            checks.push(("segment_scores", scores.len()));
        }
        for (field, actual) in checks {
            if actual != expected {
                return Err(MetricError::SegmentCountMismatch {
                    metric,
                    field,
                    expected,
                    actual,
                });
            }
        }

        Ok(Self {
            metric,
            system_score,
            segment_scores,
            sources: sources.to_vec(),
            hypotheses: hypotheses.to_vec(),
            references: references.to_vec(),
        })
    }

    /// Number of scored segments
    #[must_use]
    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    /// Check if no segments were scored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }
}

/// Capability interface implemented by every metric
pub trait MetricAdapter: Send + Sync {
    /// Metric name as shown in reports
    fn name(&self) -> &str;

    /// Whether `score` populates `segment_scores`
    fn segment_level(&self) -> bool;

    /// Whether the system score is the arithmetic mean of the segment scores.
    ///
    /// Only then may bootstrap trials reuse precomputed segment scores.
    fn system_score_is_segment_mean(&self) -> bool {
        false
    }

    /// Whether the metric can score text in `language`
    fn language_support(&self, _language: &str) -> bool {
        true
    }

    /// Key under which scores are cached
    ///
    /// Must change whenever the scores the metric would produce change.
    fn identity(&self) -> String {
        self.name().to_string()
    }

    /// Score hypotheses against references
    ///
    /// # Errors
    ///
    /// Returns an error on empty or misaligned input, or if the underlying
    /// scorer fails.
    fn score(
        &self,
        sources: &[String],
        hypotheses: &[String],
        references: &[String],
    ) -> Result<MetricResult, MetricError>;
}

/// Fail unless the input is non-empty and aligned
///
/// # Errors
///
/// Returns `EmptyCorpus` or `SegmentCountMismatch`.
pub fn check_input(
    metric: &str,
    sources: &[String],
    hypotheses: &[String],
    references: &[String],
) -> Result<(), MetricError> {
    if hypotheses.is_empty() {
        return Err(MetricError::EmptyCorpus {
            metric: metric.to_string(),
        });
    }
    for (field, actual) in [("sources", sources.len()), ("references", references.len())] {
        if actual != hypotheses.len() {
            return Err(MetricError::SegmentCountMismatch {
                metric: metric.to_string(),
                field,
                expected: hypotheses.len(),
                actual,
            });
        }
    }
    Ok(())
}

/// Fraction of hypotheses identical to their reference
///
/// Each segment scores 1.0 on an exact match and 0.0 otherwise; the system
/// score is the mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroEdit;

impl ZeroEdit {
    pub const NAME: &'static str = "ZeroEdit";
}

impl MetricAdapter for ZeroEdit {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn segment_level(&self) -> bool {
        true
    }

    fn system_score_is_segment_mean(&self) -> bool {
        true
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(
        &self,
        sources: &[String],
        hypotheses: &[String],
        references: &[String],
    ) -> Result<MetricResult, MetricError> {
        check_input(Self::NAME, sources, hypotheses, references)?;

        let segment_scores: Vec<f64> = hypotheses
            .iter()
            .zip(references)
            .map(|(h, r)| if h == r { 1.0 } else { 0.0 })
            .collect();
        let system_score = segment_scores.iter().sum::<f64>() / segment_scores.len() as f64;

        MetricResult::new(
            Self::NAME,
            system_score,
            Some(segment_scores),
            sources,
            hypotheses,
            references,
        )
    }
}

/// Total hypothesis characters over total reference characters
///
/// A corpus-level ratio: resampled scores must be recomputed, not averaged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthRatio;

impl LengthRatio {
    pub const NAME: &'static str = "LengthRatio";
}

impl MetricAdapter for LengthRatio {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn segment_level(&self) -> bool {
        false
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(
        &self,
        sources: &[String],
        hypotheses: &[String],
        references: &[String],
    ) -> Result<MetricResult, MetricError> {
        check_input(Self::NAME, sources, hypotheses, references)?;

        let hyp_chars: usize = hypotheses.iter().map(|h| h.chars().count()).sum();
        let ref_chars: usize = references.iter().map(|r| r.chars().count()).sum();
        if ref_chars == 0 {
            return Err(MetricError::Invocation {
                metric: Self::NAME.to_string(),
                message: "references contain no characters".to_string(),
            });
        }

        MetricResult::new(
            Self::NAME,
            hyp_chars as f64 / ref_chars as f64,
            None,
            sources,
            hypotheses,
            references,
        )
    }
}

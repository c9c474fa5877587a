//! Runs one metric over both systems of a paired corpus.

use crate::cache::ScoreCache;
use crate::corpus::AlignedCorpus;
use crate::metrics::{MetricAdapter, MetricError, MetricResult};
use crate::stats::{paired_t_test, SignificanceResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while comparing two systems
#[derive(Error, Debug)]
pub enum ComparatorError {
    #[error("{metric}: system X and Y results disagree on {field}")]
    Misaligned { metric: String, field: &'static str },

    #[error("Corpus has no system Y hypotheses; pairwise comparison needs both systems")]
    NotPaired,

    #[error(transparent)]
    Metric(#[from] MetricError),
}

/// Scores of one metric for system X and system Y over the same corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseResult {
    pub x_result: MetricResult,
    pub y_result: MetricResult,
}

impl PairwiseResult {
    /// Pair two results, checking that they were computed over the same
    /// sources and references by the same metric
    ///
    /// # Errors
    ///
    /// Returns `Misaligned` naming the first field that differs.
    pub fn new(x_result: MetricResult, y_result: MetricResult) -> Result<Self, ComparatorError> {
        let misaligned = |field| ComparatorError::Misaligned {
            metric: x_result.metric.clone(),
            field,
        };
        if x_result.metric != y_result.metric {
            return Err(misaligned("metric"));
        }
        if x_result.sources != y_result.sources {
            return Err(misaligned("sources"));
        }
        if x_result.references != y_result.references {
            return Err(misaligned("references"));
        }
        if x_result.segment_scores.is_some() != y_result.segment_scores.is_some() {
            return Err(misaligned("segment_scores"));
        }
        Ok(Self { x_result, y_result })
    }

    /// Metric name
    #[must_use]
    pub fn metric(&self) -> &str {
        &self.x_result.metric
    }

    /// System scores as `(x, y)`
    #[must_use]
    pub fn system_scores(&self) -> (f64, f64) {
        (self.x_result.system_score, self.y_result.system_score)
    }

    /// Per-segment scores as `(x, y)`, when the metric produced them
    #[must_use]
    pub fn segment_scores(&self) -> Option<(&[f64], &[f64])> {
        Some((
            self.x_result.segment_scores.as_deref()?,
            self.y_result.segment_scores.as_deref()?,
        ))
    }

    /// Number of segments scored
    #[must_use]
    pub fn len(&self) -> usize {
        self.x_result.len()
    }

    /// Check if no segments were scored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x_result.is_empty()
    }

    /// Paired t-test over per-segment scores
    ///
    /// `None` for corpus-level metrics or when the test is undefined.
    #[must_use]
    pub fn significance(&self, alpha: f64) -> Option<SignificanceResult> {
        let (x, y) = self.segment_scores()?;
        paired_t_test(x, y, alpha)
    }
}

/// Scores a metric against both systems, reusing cached results
#[derive(Debug, Default, Clone)]
pub struct PairwiseComparator {
    cache: Option<Arc<ScoreCache<PairwiseResult>>>,
}

impl PairwiseComparator {
    /// Comparator without caching
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Comparator backed by a shared score cache
    #[must_use]
    pub fn with_cache(cache: Arc<ScoreCache<PairwiseResult>>) -> Self {
        Self { cache: Some(cache) }
    }

    /// Score system X and system Y of `corpus` with `metric`
    ///
    /// # Errors
    ///
    /// Returns an error if the corpus is not paired, the metric does not
    /// support the target language, the metric fails, or the two results
    /// are misaligned.
    pub fn compare(
        &self,
        metric: &dyn MetricAdapter,
        corpus: &AlignedCorpus,
    ) -> Result<PairwiseResult, ComparatorError> {
        let hypothesis_y = corpus.hypothesis_y().ok_or(ComparatorError::NotPaired)?;

        let language = corpus.target_language();
        if !metric.language_support(language) {
            return Err(MetricError::UnsupportedLanguage {
                metric: metric.name().to_string(),
                language: language.to_string(),
            }
            .into());
        }

        // Keyed by metric identity so a reconfigured scorer misses the cache
        let key = format!("{}:{}", metric.identity(), corpus.fingerprint());
        if let Some(cached) = self
            .cache
            .as_ref()
            .and_then(|c| c.get(metric.name(), &key))
        {
            return Ok(cached);
        }

        tracing::info!(metric = metric.name(), segments = corpus.len(), "Scoring systems");
        let x_result = metric.score(corpus.source(), corpus.hypothesis_x(), corpus.reference())?;
        let y_result = metric.score(corpus.source(), hypothesis_y, corpus.reference())?;
        let result = PairwiseResult::new(x_result, y_result)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.insert(metric.name(), &key, result.clone()) {
                tracing::warn!(metric = metric.name(), error = %e, "Failed to persist scores");
            }
        }
        Ok(result)
    }
}

//! Ordered application of corpus filters.
//!
//! Each stage sees the output of the previous one, so the order of filters
//! matters. Stages whose filter cannot handle the corpus languages are skipped
//! with a warning unless the pipeline is strict.

use crate::corpus::{AlignedCorpus, CorpusError};
use crate::filters::{Filter, FilterError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while running a filter pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Filter failed: {0}")]
    Filter(#[from] FilterError),

    #[error("Filter returned invalid indices: {0}")]
    Corpus(#[from] CorpusError),
}

/// What one pipeline stage did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Filter name
    pub filter: String,
    /// Segments entering the stage
    pub input_len: usize,
    /// Segments leaving the stage
    pub output_len: usize,
    /// Whether the stage was skipped as inapplicable
    pub skipped: bool,
}

/// Result of running a pipeline
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Filtered corpus
    pub corpus: AlignedCorpus,
    /// Size of the corpus before filtering
    pub original_len: usize,
    /// `1 - filtered / original` (0 for an empty input)
    pub reduction_ratio: f64,
    /// Per-stage trace, in application order
    pub stages: Vec<StageReport>,
}

impl PipelineOutcome {
    /// Reduction as a percentage
    #[must_use]
    pub fn reduction_percent(&self) -> f64 {
        self.reduction_ratio * 100.0
    }

    /// Names of the filters that were skipped
    #[must_use]
    pub fn skipped(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.skipped)
            .map(|s| s.filter.as_str())
            .collect()
    }
}

/// Ordered list of filters applied one after another
#[derive(Default)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
    strict: bool,
}

impl FilterPipeline {
    /// Create an empty, lenient pipeline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter stage
    #[must_use]
    pub fn with_filter(mut self, filter: Box<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Append a filter stage in place
    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Fail on inapplicable filters instead of skipping them
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Number of stages
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if the pipeline has no stages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filter names in application order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run every stage in order, returning the filtered corpus
    ///
    /// An empty result is propagated, not treated as a failure.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter fails, or, in strict mode, if a filter
    /// does not support the corpus languages.
    #[allow(clippy::cast_precision_loss)]
    pub fn apply(&self, corpus: &AlignedCorpus) -> Result<PipelineOutcome, PipelineError> {
        let original_len = corpus.len();
        let mut current = corpus.clone();
        let mut stages = Vec::with_capacity(self.filters.len());

        for filter in &self.filters {
            let input_len = current.len();

            if !self.strict && !filter.is_applicable(&current) {
                tracing::warn!(
                    filter = filter.name(),
                    languages = %current.languages(),
                    "Filter not applicable to language pair, skipping"
                );
                stages.push(StageReport {
                    filter: filter.name().to_string(),
                    input_len,
                    output_len: input_len,
                    skipped: true,
                });
                continue;
            }

            let keep = filter.apply(&current)?;
            current = current.select(&keep)?;

            tracing::debug!(
                filter = filter.name(),
                input = input_len,
                output = current.len(),
                "Filter applied"
            );
            stages.push(StageReport {
                filter: filter.name().to_string(),
                input_len,
                output_len: current.len(),
                skipped: false,
            });
        }

        let reduction_ratio = if original_len == 0 {
            0.0
        } else {
            1.0 - current.len() as f64 / original_len as f64
        };

        tracing::info!(
            original = original_len,
            filtered = current.len(),
            reduction_percent = reduction_ratio * 100.0,
            "Filter pipeline finished"
        );

        Ok(PipelineOutcome {
            corpus: current,
            original_len,
            reduction_ratio,
            stages,
        })
    }
}

impl std::fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPipeline")
            .field("filters", &self.names())
            .field("strict", &self.strict)
            .finish()
    }
}

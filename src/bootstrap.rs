//! Paired bootstrap resampling.
//!
//! Each trial draws `sample_size` segment indices uniformly with replacement,
//! scores both systems on the drawn segments and records which one won.
//! Confidence bounds are order statistics of the sorted per-trial scores.
//!
//! Two resampling strategies exist:
//!
//! - **Segment mean**: for metrics whose system score is the mean of segment
//!   scores, a trial's score is the mean of precomputed segment scores at the
//!   drawn indices. No metric invocation happens per trial.
//! - **Recompute**: otherwise the drawn sub-corpus (repeats included) is
//!   rebuilt and the metric is invoked on it for both systems.
//!
//! Trial `t` uses a `ChaCha8Rng` seeded with the configured seed on stream
//! `t`, so results do not depend on the number of worker threads.
//!
//! Ties are exact floating-point equality, so continuous metrics rarely tie
//! even when the systems are indistinguishable.

use crate::comparator::PairwiseResult;
use crate::config::BootstrapSettings;
use crate::corpus::{AlignedCorpus, CorpusError};
use crate::metrics::{MetricAdapter, MetricError};
use crate::stats;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::thread;
use thiserror::Error;

/// Lower bound percentile of the empirical interval
pub const LOWER_PERCENTILE: f64 = 0.025;
/// Upper bound percentile of the empirical interval
pub const UPPER_PERCENTILE: f64 = 0.975;

/// Errors that can occur during bootstrap resampling
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Cannot bootstrap an empty corpus")]
    EmptyCorpus,

    #[error("Bootstrap needs system Y hypotheses")]
    NotPaired,

    #[error("Bootstrap is disabled (num_samples = 0)")]
    Disabled,

    #[error("Invalid sample ratio {0}: must be in (0, 1]")]
    InvalidSampleRatio(f64),

    #[error("{metric}: precomputed scores cover {actual} segments, corpus has {expected}")]
    MissingSegmentScores {
        metric: String,
        expected: usize,
        actual: usize,
    },

    #[error("{metric}: precomputed scores were computed over different {field}")]
    PrecomputedMismatch { metric: String, field: &'static str },

    #[error("Bootstrap worker panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),
}

/// Resampling settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Number of trials
    pub num_samples: usize,
    /// Fraction of the corpus drawn per trial
    pub sample_ratio: f64,
    /// Random seed
    pub seed: u64,
    /// Worker threads (1 = sequential)
    pub threads: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            num_samples: 300,
            sample_ratio: 0.5,
            seed: 42,
            threads: 1,
        }
    }
}

impl From<&BootstrapSettings> for BootstrapConfig {
    fn from(settings: &BootstrapSettings) -> Self {
        Self {
            num_samples: settings.num_samples,
            sample_ratio: settings.sample_ratio,
            seed: settings.seed,
            threads: settings.threads,
        }
    }
}

impl BootstrapConfig {
    /// Whether resampling should run at all
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.num_samples > 0
    }

    /// `max(round(n * sample_ratio), 1)`
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn sample_size(&self, corpus_len: usize) -> usize {
        ((corpus_len as f64 * self.sample_ratio).round() as usize).max(1)
    }
}

/// How trial scores are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingStrategy {
    /// Mean of precomputed segment scores
    SegmentMean,
    /// Re-invoke the metric on the drawn sub-corpus
    Recompute,
}

/// Win/loss/tie tally over all trials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinCount {
    pub x_wins: usize,
    pub y_wins: usize,
    pub ties: usize,
}

impl WinCount {
    /// Record one trial
    pub fn record(&mut self, x_score: f64, y_score: f64) {
        match x_score.partial_cmp(&y_score) {
            Some(Ordering::Greater) => self.x_wins += 1,
            Some(Ordering::Less) => self.y_wins += 1,
            _ => self.ties += 1,
        }
    }

    /// Number of trials recorded
    #[must_use]
    pub const fn total(&self) -> usize {
        self.x_wins + self.y_wins + self.ties
    }
}

/// Summary of one system's resampled scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideStats {
    pub mean: f64,
    pub median: f64,
    /// 2.5th percentile of the sorted scores
    pub lower_bound: f64,
    /// 97.5th percentile of the sorted scores
    pub upper_bound: f64,
}

impl SideStats {
    /// Summarize per-trial scores; `None` if there are none
    #[must_use]
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        let sorted = stats::sorted_copy(scores);
        Some(Self {
            mean: stats::mean(scores)?,
            median: stats::median(&sorted)?,
            lower_bound: stats::order_statistic(&sorted, LOWER_PERCENTILE)?,
            upper_bound: stats::order_statistic(&sorted, UPPER_PERCENTILE)?,
        })
    }
}

/// Outcome of a bootstrap run for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub metric: String,
    pub strategy: ResamplingStrategy,
    pub sample_size: usize,
    /// System X score per trial, in trial order
    pub x_scores: Vec<f64>,
    /// System Y score per trial, in trial order
    pub y_scores: Vec<f64>,
    pub win_count: WinCount,
    pub x_stats: SideStats,
    pub y_stats: SideStats,
}

impl BootstrapResult {
    /// Number of trials
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.x_scores.len()
    }

    /// Fraction of trials system X won
    #[must_use]
    pub fn x_win_rate(&self) -> f64 {
        self.rate(self.win_count.x_wins)
    }

    /// Fraction of trials system Y won
    #[must_use]
    pub fn y_win_rate(&self) -> f64 {
        self.rate(self.win_count.y_wins)
    }

    /// Fraction of trials that tied
    #[must_use]
    pub fn tie_rate(&self) -> f64 {
        self.rate(self.win_count.ties)
    }

    #[allow(clippy::cast_precision_loss)]
    fn rate(&self, count: usize) -> f64 {
        if self.num_samples() == 0 {
            0.0
        } else {
            count as f64 / self.num_samples() as f64
        }
    }
}

enum Resampler<'a> {
    SegmentMean {
        x: &'a [f64],
        y: &'a [f64],
    },
    Recompute {
        corpus: &'a AlignedCorpus,
        metric: &'a dyn MetricAdapter,
    },
}

impl Resampler<'_> {
    const fn strategy(&self) -> ResamplingStrategy {
        match self {
            Self::SegmentMean { .. } => ResamplingStrategy::SegmentMean,
            Self::Recompute { .. } => ResamplingStrategy::Recompute,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn scores(&self, indices: &[usize]) -> Result<(f64, f64), BootstrapError> {
        match self {
            Self::SegmentMean { x, y } => {
                let count = indices.len() as f64;
                let x_score = indices.iter().map(|&i| x[i]).sum::<f64>() / count;
                let y_score = indices.iter().map(|&i| y[i]).sum::<f64>() / count;
                Ok((x_score, y_score))
            }
            Self::Recompute { corpus, metric } => {
                let sample = corpus.select(indices)?;
                let hypothesis_y = sample.hypothesis_y().ok_or(BootstrapError::NotPaired)?;
                let x = metric.score(sample.source(), sample.hypothesis_x(), sample.reference())?;
                let y = metric.score(sample.source(), hypothesis_y, sample.reference())?;
                Ok((x.system_score, y.system_score))
            }
        }
    }
}

/// Paired bootstrap significance engine
#[derive(Debug, Clone, Default)]
pub struct BootstrapEngine {
    config: BootstrapConfig,
}

impl BootstrapEngine {
    /// Create an engine
    ///
    /// # Errors
    ///
    /// Returns `InvalidSampleRatio` unless the ratio is in `(0, 1]`.
    pub fn new(config: BootstrapConfig) -> Result<Self, BootstrapError> {
        if !(config.sample_ratio > 0.0 && config.sample_ratio <= 1.0) {
            return Err(BootstrapError::InvalidSampleRatio(config.sample_ratio));
        }
        Ok(Self { config })
    }

    /// Engine settings
    #[must_use]
    pub const fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Strategy `run` would use for this metric and precomputed result
    #[must_use]
    pub fn strategy_for(
        metric: &dyn MetricAdapter,
        precomputed: Option<&PairwiseResult>,
    ) -> ResamplingStrategy {
        let reusable = metric.segment_level()
            && metric.system_score_is_segment_mean()
            && precomputed.is_some_and(|p| p.segment_scores().is_some());
        if reusable {
            ResamplingStrategy::SegmentMean
        } else {
            ResamplingStrategy::Recompute
        }
    }

    /// Segment indices drawn in `trial` from a corpus of `corpus_len`
    ///
    /// Deterministic in `(seed, trial)`.
    #[must_use]
    pub fn trial_indices(&self, trial: usize, corpus_len: usize) -> Vec<usize> {
        let sample_size = self.config.sample_size(corpus_len);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        rng.set_stream(trial as u64);
        (0..sample_size).map(|_| rng.gen_range(0..corpus_len)).collect()
    }

    /// Run every trial and summarize the results
    ///
    /// # Errors
    ///
    /// Returns an error if bootstrap is disabled, the corpus is empty or
    /// unpaired, precomputed scores do not cover the corpus, or the metric
    /// fails during recomputation.
    pub fn run(
        &self,
        corpus: &AlignedCorpus,
        metric: &dyn MetricAdapter,
        precomputed: Option<&PairwiseResult>,
    ) -> Result<BootstrapResult, BootstrapError> {
        let num_samples = self.config.num_samples;
        if num_samples == 0 {
            return Err(BootstrapError::Disabled);
        }
        let n = corpus.len();
        if n == 0 {
            return Err(BootstrapError::EmptyCorpus);
        }
        if !corpus.is_paired() {
            return Err(BootstrapError::NotPaired);
        }

        let resampler = match (Self::strategy_for(metric, precomputed), precomputed) {
            (ResamplingStrategy::SegmentMean, Some(pairwise)) => {
                let (x, y) = pairwise.segment_scores().ok_or_else(|| {
                    BootstrapError::MissingSegmentScores {
                        metric: metric.name().to_string(),
                        expected: n,
                        actual: 0,
                    }
                })?;
                for side in [x, y] {
                    if side.len() != n {
                        return Err(BootstrapError::MissingSegmentScores {
                            metric: metric.name().to_string(),
                            expected: n,
                            actual: side.len(),
                        });
                    }
                }
                let mismatch = if pairwise.x_result.sources.as_slice() != corpus.source() {
                    Some("sources")
                } else if pairwise.x_result.references.as_slice() != corpus.reference() {
                    Some("references")
                } else if pairwise.x_result.hypotheses.as_slice() != corpus.hypothesis_x()
                    || Some(pairwise.y_result.hypotheses.as_slice()) != corpus.hypothesis_y()
                {
                    Some("hypotheses")
                } else {
                    None
                };
                if let Some(field) = mismatch {
                    return Err(BootstrapError::PrecomputedMismatch {
                        metric: metric.name().to_string(),
                        field,
                    });
                }
                Resampler::SegmentMean { x, y }
            }
            _ => Resampler::Recompute { corpus, metric },
        };

        let sample_size = self.config.sample_size(n);
        tracing::info!(
            metric = metric.name(),
            strategy = ?resampler.strategy(),
            num_samples,
            sample_size,
            threads = self.config.threads,
            "Bootstrap resampling started"
        );

        let trials = self.run_trials(&resampler, n)?;

        let mut win_count = WinCount::default();
        let mut x_scores = Vec::with_capacity(num_samples);
        let mut y_scores = Vec::with_capacity(num_samples);
        for (x, y) in trials {
            win_count.record(x, y);
            x_scores.push(x);
            y_scores.push(y);
        }

        let x_stats = SideStats::from_scores(&x_scores).ok_or(BootstrapError::EmptyCorpus)?;
        let y_stats = SideStats::from_scores(&y_scores).ok_or(BootstrapError::EmptyCorpus)?;

        let result = BootstrapResult {
            metric: metric.name().to_string(),
            strategy: resampler.strategy(),
            sample_size,
            x_scores,
            y_scores,
            win_count,
            x_stats,
            y_stats,
        };

        tracing::info!(
            metric = metric.name(),
            x_wins = result.win_count.x_wins,
            y_wins = result.win_count.y_wins,
            ties = result.win_count.ties,
            "Bootstrap resampling finished"
        );
        Ok(result)
    }

    fn run_trials(
        &self,
        resampler: &Resampler<'_>,
        n: usize,
    ) -> Result<Vec<(f64, f64)>, BootstrapError> {
        let num_samples = self.config.num_samples;
        let trial = |t: usize| resampler.scores(&self.trial_indices(t, n));

        let threads = self.config.threads.clamp(1, num_samples);
        if threads == 1 {
            return (0..num_samples).map(trial).collect();
        }

        let chunk = num_samples.div_ceil(threads);
        let trial = &trial;
        thread::scope(|scope| {
            let handles: Vec<_> = (0..num_samples)
                .step_by(chunk)
                .map(|start| {
                    let end = (start + chunk).min(num_samples);
                    scope.spawn(move || (start..end).map(trial).collect::<Result<Vec<_>, _>>())
                })
                .collect();

            let mut out = Vec::with_capacity(num_samples);
            for handle in handles {
                let part = handle.join().map_err(|_| BootstrapError::WorkerPanicked)??;
                out.extend(part);
            }
            Ok(out)
        })
    }
}

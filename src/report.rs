//! Report generation for system comparisons.
//!
//! Generates:
//! - The results table (one row per metric, X and Y system scores)
//! - Bootstrap win rates and confidence intervals
//! - Paired significance tests with Bonferroni correction
//! - Quality-bucket analysis of the segment-level metric
//!
//! `results.json` is a keyed object in metric order:
//! `{"ZeroEdit": {"x": 0.55, "y": 0.47, ...}, ...}`.

use crate::bootstrap::{BootstrapConfig, BootstrapResult};
use crate::comparator::PairwiseResult;
use crate::corpus::LanguagePair;
use crate::metrics::MetricResult;
use crate::pipeline::{PipelineOutcome, StageReport};
use crate::stats::{bonferroni_correction, SignificanceResult};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::Write as FmtWrite;
use tabled::{Table, Tabled};

/// Full comparison report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub metadata: ReportMetadata,
    pub corpus: CorpusSummary,
    /// Per-metric results, segment metric first
    pub metrics: Vec<MetricSummary>,
    /// Paired t-tests for segment-level metrics
    pub significance: Vec<MetricSignificance>,
    pub quality_buckets: Option<BucketAnalysis>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub title: String,
    pub languages: String,
    pub generated_at: DateTime<Utc>,
    pub framework_version: String,
    /// Bootstrap settings, when bootstrap ran
    pub bootstrap: Option<BootstrapConfig>,
    /// Family-wise significance level before correction
    pub alpha: f64,
}

/// Corpus size before and after filtering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSummary {
    pub original_segments: usize,
    pub filtered_segments: usize,
    pub reduction_percent: f64,
    pub stages: Vec<StageReport>,
}

impl CorpusSummary {
    /// Summarize a pipeline run
    #[must_use]
    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        Self {
            original_segments: outcome.original_len,
            filtered_segments: outcome.corpus.len(),
            reduction_percent: outcome.reduction_percent(),
            stages: outcome.stages.clone(),
        }
    }

    /// One-line reduction notice shown after filtering
    #[must_use]
    pub fn reduction_message(&self) -> String {
        format!(
            "Filters Successfully applied. Corpus reduced in {:.2}%.",
            self.reduction_percent
        )
    }
}

/// One row of the results table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: String,
    pub x_score: f64,
    pub y_score: f64,
    pub bootstrap: Option<BootstrapSummary>,
}

/// Bootstrap statistics as reported (win rates in percent)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub x_wins_pct: f64,
    pub y_wins_pct: f64,
    pub ties_pct: f64,
    pub x_mean: f64,
    pub y_mean: f64,
    pub x_median: f64,
    pub y_median: f64,
    pub x_ci_lower: f64,
    pub x_ci_upper: f64,
    pub y_ci_lower: f64,
    pub y_ci_upper: f64,
}

impl From<&BootstrapResult> for BootstrapSummary {
    fn from(result: &BootstrapResult) -> Self {
        Self {
            x_wins_pct: result.x_win_rate() * 100.0,
            y_wins_pct: result.y_win_rate() * 100.0,
            ties_pct: result.tie_rate() * 100.0,
            x_mean: result.x_stats.mean,
            y_mean: result.y_stats.mean,
            x_median: result.x_stats.median,
            y_median: result.y_stats.median,
            x_ci_lower: result.x_stats.lower_bound,
            x_ci_upper: result.x_stats.upper_bound,
            y_ci_lower: result.y_stats.lower_bound,
            y_ci_upper: result.y_stats.upper_bound,
        }
    }
}

/// Paired t-test for one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSignificance {
    pub metric: String,
    /// Alpha after Bonferroni correction
    pub corrected_alpha: f64,
    pub significance: SignificanceResult,
}

/// Percentage of segments per error category for one system
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityBuckets {
    pub no_error: f64,
    pub minor: f64,
    pub major: f64,
    pub critical: f64,
}

impl QualityBuckets {
    /// Bucket segment scores with `[critical, major, minor]` thresholds
    ///
    /// A score at or above `minor` has no error, at or above `major` a minor
    /// error, at or above `critical` a major error, and below it a critical one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_scores(scores: &[f64], thresholds: [f64; 3]) -> Self {
        let [critical, major, minor] = thresholds;
        let mut counts = [0usize; 4];
        for &score in scores {
            let bucket = if score >= minor {
                0
            } else if score >= major {
                1
            } else if score >= critical {
                2
            } else {
                3
            };
            counts[bucket] += 1;
        }
        if scores.is_empty() {
            return Self::default();
        }
        let pct = |c: usize| c as f64 / scores.len() as f64 * 100.0;
        Self {
            no_error: pct(counts[0]),
            minor: pct(counts[1]),
            major: pct(counts[2]),
            critical: pct(counts[3]),
        }
    }
}

/// Quality buckets of both systems for the segment metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketAnalysis {
    pub metric: String,
    pub thresholds: [f64; 3],
    pub x: QualityBuckets,
    pub y: QualityBuckets,
}

impl BucketAnalysis {
    /// Bucket a pairwise result; `None` for corpus-level metrics
    #[must_use]
    pub fn from_pairwise(result: &PairwiseResult, thresholds: [f64; 3]) -> Option<Self> {
        let (x, y) = result.segment_scores()?;
        Some(Self {
            metric: result.metric().to_string(),
            thresholds,
            x: QualityBuckets::from_scores(x, thresholds),
            y: QualityBuckets::from_scores(y, thresholds),
        })
    }
}

/// Report builder
pub struct ReportBuilder {
    languages: LanguagePair,
    alpha: f64,
    bootstrap: Option<BootstrapConfig>,
    corpus: CorpusSummary,
    metrics: Vec<MetricSummary>,
    segment_scores: Vec<Option<(Vec<f64>, Vec<f64>)>>,
    buckets: Option<BucketAnalysis>,
}

impl ReportBuilder {
    /// Create a new report builder
    #[must_use]
    pub fn new(languages: LanguagePair) -> Self {
        Self {
            languages,
            alpha: 0.05,
            bootstrap: None,
            corpus: CorpusSummary::default(),
            metrics: Vec::new(),
            segment_scores: Vec::new(),
            buckets: None,
        }
    }

    /// Set the significance level
    #[must_use]
    pub const fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Record the bootstrap settings used
    #[must_use]
    pub const fn with_bootstrap_config(mut self, config: BootstrapConfig) -> Self {
        self.bootstrap = Some(config);
        self
    }

    /// Record the filtering outcome
    #[must_use]
    pub fn with_corpus(mut self, corpus: CorpusSummary) -> Self {
        self.corpus = corpus;
        self
    }

    /// Attach quality-bucket analysis
    #[must_use]
    pub fn with_buckets(mut self, buckets: Option<BucketAnalysis>) -> Self {
        self.buckets = buckets;
        self
    }

    /// Add one metric's scores and, optionally, its bootstrap result
    pub fn add_metric(&mut self, result: &PairwiseResult, bootstrap: Option<&BootstrapResult>) {
        let (x_score, y_score) = result.system_scores();
        self.metrics.push(MetricSummary {
            metric: result.metric().to_string(),
            x_score,
            y_score,
            bootstrap: bootstrap.map(BootstrapSummary::from),
        });
        self.segment_scores
            .push(result.segment_scores().map(|(x, y)| (x.to_vec(), y.to_vec())));
    }

    /// Build the report
    #[must_use]
    pub fn build(self) -> ComparisonReport {
        let tested = self.segment_scores.iter().filter(|s| s.is_some()).count();
        let corrected_alpha = bonferroni_correction(self.alpha, tested);

        let significance = self
            .metrics
            .iter()
            .zip(&self.segment_scores)
            .filter_map(|(summary, scores)| {
                let (x, y) = scores.as_ref()?;
                let significance = crate::stats::paired_t_test(x, y, corrected_alpha)?;
                Some(MetricSignificance {
                    metric: summary.metric.clone(),
                    corrected_alpha,
                    significance,
                })
            })
            .collect();

        ComparisonReport {
            metadata: ReportMetadata {
                title: format!("System Comparison: {}", self.languages),
                languages: self.languages.to_string(),
                generated_at: Utc::now(),
                framework_version: env!("CARGO_PKG_VERSION").to_string(),
                bootstrap: self.bootstrap,
                alpha: self.alpha,
            },
            corpus: self.corpus,
            metrics: self.metrics,
            significance,
            quality_buckets: self.buckets,
        }
    }
}

/// Keyed `results.json` view of a report, in metric order
pub struct ResultsTable<'a>(&'a [MetricSummary]);

impl Serialize for ResultsTable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Entry<'a> {
            x: f64,
            y: f64,
            #[serde(flatten)]
            bootstrap: Option<&'a BootstrapSummary>,
        }

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for summary in self.0 {
            map.serialize_entry(
                &summary.metric,
                &Entry {
                    x: summary.x_score,
                    y: summary.y_score,
                    bootstrap: summary.bootstrap.as_ref(),
                },
            )?;
        }
        map.end()
    }
}

#[derive(Tabled)]
struct ResultTableRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "System X")]
    x: String,
    #[tabled(rename = "System Y")]
    y: String,
}

#[derive(Tabled)]
struct BootstrapTableRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "X wins")]
    x_wins: String,
    #[tabled(rename = "Y wins")]
    y_wins: String,
    #[tabled(rename = "Ties")]
    ties: String,
    #[tabled(rename = "X mean [95% CI]")]
    x: String,
    #[tabled(rename = "Y mean [95% CI]")]
    y: String,
}

#[derive(Tabled)]
struct BucketTableRow {
    #[tabled(rename = "System")]
    system: String,
    #[tabled(rename = "No error")]
    no_error: String,
    #[tabled(rename = "Minor")]
    minor: String,
    #[tabled(rename = "Major")]
    major: String,
    #[tabled(rename = "Critical")]
    critical: String,
}

impl ComparisonReport {
    /// `results.json` view
    #[must_use]
    pub fn results_table(&self) -> ResultsTable<'_> {
        ResultsTable(&self.metrics)
    }

    /// Render `results.json`
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn results_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.results_table())
    }

    /// Render the full report as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn has_bootstrap(&self) -> bool {
        self.metrics.iter().any(|m| m.bootstrap.is_some())
    }

    fn result_rows(&self) -> Vec<ResultTableRow> {
        self.metrics
            .iter()
            .map(|m| ResultTableRow {
                metric: m.metric.clone(),
                x: format!("{:.4}", m.x_score),
                y: format!("{:.4}", m.y_score),
            })
            .collect()
    }

    fn bootstrap_rows(&self) -> Vec<BootstrapTableRow> {
        self.metrics
            .iter()
            .filter_map(|m| {
                let b = m.bootstrap.as_ref()?;
                Some(BootstrapTableRow {
                    metric: m.metric.clone(),
                    x_wins: format!("{:.2}%", b.x_wins_pct),
                    y_wins: format!("{:.2}%", b.y_wins_pct),
                    ties: format!("{:.2}%", b.ties_pct),
                    x: format!("{:.4} [{:.4}, {:.4}]", b.x_mean, b.x_ci_lower, b.x_ci_upper),
                    y: format!("{:.4} [{:.4}, {:.4}]", b.y_mean, b.y_ci_lower, b.y_ci_upper),
                })
            })
            .collect()
    }

    fn bucket_rows(buckets: &BucketAnalysis) -> Vec<BucketTableRow> {
        [("X", &buckets.x), ("Y", &buckets.y)]
            .into_iter()
            .map(|(system, b)| BucketTableRow {
                system: system.to_string(),
                no_error: format!("{:.2}%", b.no_error),
                minor: format!("{:.2}%", b.minor),
                major: format!("{:.2}%", b.major),
                critical: format!("{:.2}%", b.critical),
            })
            .collect()
    }

    /// Render report as markdown
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        writeln!(output, "# {}", self.metadata.title).ok();
        writeln!(output).ok();
        writeln!(
            output,
            "**Generated:** {}",
            self.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .ok();
        writeln!(output, "**Version:** {}", self.metadata.framework_version).ok();
        writeln!(output).ok();

        writeln!(output, "## Corpus").ok();
        writeln!(output).ok();
        writeln!(output, "| Segments | Filtered | Reduction |").ok();
        writeln!(output, "|----------|----------|-----------|").ok();
        writeln!(
            output,
            "| {} | {} | {:.2}% |",
            self.corpus.original_segments, self.corpus.filtered_segments, self.corpus.reduction_percent
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "## Results").ok();
        writeln!(output).ok();
        writeln!(output, "{}", Table::new(self.result_rows())).ok();
        writeln!(output).ok();

        if self.has_bootstrap() {
            writeln!(output, "## Bootstrap Resampling").ok();
            writeln!(output).ok();
            writeln!(output, "{}", Table::new(self.bootstrap_rows())).ok();
            writeln!(output).ok();
        }

        if !self.significance.is_empty() {
            writeln!(output, "## Statistical Significance").ok();
            writeln!(output).ok();
            writeln!(
                output,
                "| Metric | t-stat | p-value | α (corrected) | Effect Size | Significant |"
            )
            .ok();
            writeln!(
                output,
                "|--------|--------|---------|---------------|-------------|-------------|"
            )
            .ok();
            for test in &self.significance {
                let s = &test.significance;
                writeln!(
                    output,
                    "| {} | {:.3} | {:.4} | {:.4} | {} ({:.2}) | {} |",
                    test.metric,
                    s.t_statistic,
                    s.p_value,
                    test.corrected_alpha,
                    s.effect_interpretation,
                    s.cohens_d,
                    if s.is_significant { "Yes" } else { "No" }
                )
                .ok();
            }
            writeln!(output).ok();
        }

        if let Some(buckets) = &self.quality_buckets {
            writeln!(output, "## Error Buckets ({})", buckets.metric).ok();
            writeln!(output).ok();
            writeln!(output, "{}", Table::new(Self::bucket_rows(buckets))).ok();
            writeln!(output).ok();
        }

        if let Some(config) = &self.metadata.bootstrap {
            writeln!(output, "## Configuration").ok();
            writeln!(output).ok();
            writeln!(output, "- Bootstrap samples: {}", config.num_samples).ok();
            writeln!(output, "- Sample ratio: {}", config.sample_ratio).ok();
            writeln!(output, "- Seed: {}", config.seed).ok();
        }

        output
    }

    /// Render report as plain text
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        let rule = "───────────────────────────────────────────────────────────────";

        writeln!(output, "  {}", self.metadata.title).ok();
        writeln!(output, "{rule}").ok();
        writeln!(output, "{}", self.corpus.reduction_message()).ok();
        writeln!(
            output,
            "Segments: {} -> {}",
            self.corpus.original_segments, self.corpus.filtered_segments
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "RESULTS").ok();
        writeln!(output, "{rule}").ok();
        writeln!(output, "{}", Table::new(self.result_rows())).ok();

        if self.has_bootstrap() {
            writeln!(output).ok();
            writeln!(output, "BOOTSTRAP").ok();
            writeln!(output, "{rule}").ok();
            writeln!(output, "{}", Table::new(self.bootstrap_rows())).ok();
        }

        for test in &self.significance {
            writeln!(
                output,
                "{}: p = {:.4} ({}, {} effect)",
                test.metric,
                test.significance.p_value,
                if test.significance.is_significant {
                    "significant"
                } else {
                    "not significant"
                },
                test.significance.effect_interpretation
            )
            .ok();
        }

        if let Some(buckets) = &self.quality_buckets {
            writeln!(output).ok();
            writeln!(output, "ERROR BUCKETS ({})", buckets.metric).ok();
            writeln!(output, "{rule}").ok();
            writeln!(output, "{}", Table::new(Self::bucket_rows(buckets))).ok();
        }

        output
    }
}

#[derive(Tabled)]
struct ScoreTableRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Score")]
    score: String,
}

/// Results of scoring a single system
#[derive(Debug, Clone, Default)]
pub struct ScoreReport {
    pub results: Vec<MetricResult>,
}

impl Serialize for ScoreReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.results.len()))?;
        for result in &self.results {
            map.serialize_entry(&result.metric, &result.system_score)?;
        }
        map.end()
    }
}

impl ScoreReport {
    /// Render as a text table
    #[must_use]
    pub fn to_text(&self) -> String {
        let rows: Vec<ScoreTableRow> = self
            .results
            .iter()
            .map(|r| ScoreTableRow {
                metric: r.metric.clone(),
                score: format!("{:.4}", r.system_score),
            })
            .collect();
        Table::new(rows).to_string()
    }

    /// Render as keyed JSON `{metric: score}`
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

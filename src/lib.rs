//! # MT Pairwise Eval
//!
//! Paired significance testing for comparing two machine translation systems
//! over the same source and reference corpus.
//!
//! ## Workflow
//!
//! ```text
//! Aligned corpus (source, system X, system Y, reference)
//!        ↓
//! Filter pipeline (duplicates, length, named entities, terminology)
//!        ↓
//! Metric adapters (built-in or external command, cached)
//!        ↓
//! Paired bootstrap resampling (win counts, 95% intervals)
//!        ↓
//! Report (results.json, Markdown, text table)
//! ```
//!
//! A system wins a bootstrap trial when its score on the resampled corpus
//! is strictly higher; equal scores count as ties.

pub mod bootstrap;
pub mod cache;
pub mod comparator;
pub mod config;
pub mod corpus;
pub mod external;
pub mod filters;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod runner;
pub mod stats;

pub use bootstrap::{
    BootstrapConfig, BootstrapEngine, BootstrapError, BootstrapResult, ResamplingStrategy,
    SideStats, WinCount,
};
pub use cache::{CacheError, CacheStats, ScoreCache};
pub use comparator::{ComparatorError, PairwiseComparator, PairwiseResult};
pub use config::{
    BootstrapSettings, CompareConfig, ConfigError, ExternalMetricConfig, FilterKind,
};
pub use corpus::{AlignedCorpus, CorpusError, CorpusStats, LanguagePair, Segment};
pub use external::CommandMetric;
pub use filters::{
    DuplicatesFilter, EntityDetector, Filter, FilterError, GazetteerDetector, LengthFilter,
    NerFilter, TerminologyFilter,
};
pub use metrics::{LengthRatio, MetricAdapter, MetricError, MetricResult, ZeroEdit};
pub use pipeline::{FilterPipeline, PipelineError, PipelineOutcome, StageReport};
pub use registry::{MetricRegistry, RegistryError};
pub use report::{
    BootstrapSummary, BucketAnalysis, ComparisonReport, CorpusSummary, MetricSummary,
    QualityBuckets, ReportBuilder, ReportMetadata, ScoreReport,
};
pub use runner::{ComparisonOutcome, ComparisonRunner, RunnerError};
pub use stats::{bonferroni_correction, paired_t_test, SignificanceResult};

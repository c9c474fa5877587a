//! End-to-end comparison runs.
//!
//! Filters the corpus, scores both systems with every requested metric
//! (optionally several metrics at once), bootstraps each metric and
//! assembles the report.

use crate::bootstrap::{BootstrapConfig, BootstrapEngine, BootstrapError, BootstrapResult};
use crate::cache::ScoreCache;
use crate::comparator::{ComparatorError, PairwiseComparator, PairwiseResult};
use crate::config::{CompareConfig, ConfigError, FilterKind};
use crate::corpus::{AlignedCorpus, CorpusError};
use crate::filters::{
    DuplicatesFilter, EntityDetector, Filter, FilterError, GazetteerDetector, LengthFilter,
    NerFilter, TerminologyFilter,
};
use crate::metrics::{MetricAdapter, MetricError};
use crate::pipeline::{FilterPipeline, PipelineError, PipelineOutcome};
use crate::registry::{MetricRegistry, RegistryError};
use crate::report::{BucketAnalysis, ComparisonReport, CorpusSummary, ReportBuilder, ScoreReport};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

/// Errors that can occur during a comparison run
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error(transparent)]
    Comparator(#[from] ComparatorError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("Segment metric {0} does not produce segment-level scores")]
    NotSegmentLevel(String),

    #[error("The {filter} filter needs {what}")]
    MissingFilterInput { filter: FilterKind, what: &'static str },

    #[error("Metric worker panicked")]
    WorkerPanicked,

    #[error("Failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Everything produced by one comparison run
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub filtered: PipelineOutcome,
    /// Per-metric scores, segment metric first
    pub pairwise: Vec<PairwiseResult>,
    /// Per-metric bootstrap results, empty when bootstrap is disabled
    pub bootstrap: Vec<BootstrapResult>,
    pub report: ComparisonReport,
}

impl ComparisonOutcome {
    /// Write `results.json`, `report.json` and `report.md` into `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a file cannot be written.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, RunnerError> {
        fs::create_dir_all(dir)?;
        let files = [
            ("results.json", self.report.results_json()?),
            ("report.json", self.report.to_json()?),
            ("report.md", self.report.to_markdown()),
        ];
        let mut written = Vec::with_capacity(files.len());
        for (name, content) in files {
            let path = dir.join(name);
            fs::write(&path, content)?;
            written.push(path);
        }
        tracing::info!(dir = %dir.display(), "Results written");
        Ok(written)
    }
}

/// Runs comparisons according to a [`CompareConfig`]
pub struct ComparisonRunner<'r> {
    config: CompareConfig,
    registry: &'r MetricRegistry,
    comparator: PairwiseComparator,
    detector: Option<Arc<dyn EntityDetector>>,
}

impl<'r> ComparisonRunner<'r> {
    /// Create a runner, registering the configured external metrics
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: CompareConfig, registry: &'r MetricRegistry) -> Result<Self, RunnerError> {
        config.validate()?;
        for external in &config.external_metrics {
            registry.register_external(external.clone());
        }
        let cache = match &config.cache_dir {
            Some(dir) => ScoreCache::persistent(dir.clone()),
            None => ScoreCache::in_memory(),
        };
        Ok(Self {
            config,
            registry,
            comparator: PairwiseComparator::with_cache(Arc::new(cache)),
            detector: None,
        })
    }

    /// Use `detector` for the named-entity filter instead of a gazetteer file
    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn EntityDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Run configuration
    #[must_use]
    pub const fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// Build the configured filter pipeline
    ///
    /// # Errors
    ///
    /// Returns an error if a filter's glossary or entity list is missing or
    /// unreadable.
    pub fn build_pipeline(&self) -> Result<FilterPipeline, RunnerError> {
        let mut pipeline = FilterPipeline::new().strict(self.config.strict_filters);
        for kind in &self.config.filters {
            let filter: Box<dyn Filter> = match kind {
                FilterKind::Duplicates => Box::new(DuplicatesFilter),
                FilterKind::Length => {
                    let (min, max) = self.config.length_range;
                    Box::new(LengthFilter::new(min, max))
                }
                FilterKind::NamedEntities => {
                    let detector: Arc<dyn EntityDetector> = match (&self.detector, &self.config.entities) {
                        (Some(detector), _) => Arc::clone(detector),
                        (None, Some(path)) => Arc::new(GazetteerDetector::from_file(path)?),
                        (None, None) => {
                            return Err(RunnerError::MissingFilterInput {
                                filter: *kind,
                                what: "an entity list",
                            })
                        }
                    };
                    Box::new(NerFilter::new(detector))
                }
                FilterKind::Terminology => {
                    let path =
                        self.config
                            .glossary
                            .as_ref()
                            .ok_or(RunnerError::MissingFilterInput {
                                filter: *kind,
                                what: "a glossary",
                            })?;
                    Box::new(TerminologyFilter::from_file(path)?)
                }
            };
            pipeline.push(filter);
        }
        Ok(pipeline)
    }

    /// Registry spellings of `names`, first occurrence kept
    ///
    /// Unknown names pass through unchanged and fail on lookup.
    fn canonical_names(&self, names: &[String]) -> Vec<String> {
        let mut seen = HashSet::with_capacity(names.len());
        names
            .iter()
            .map(|name| self.registry.resolve(name).unwrap_or_else(|| name.clone()))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    fn resolve_metrics(
        &self,
        names: &[String],
        language: &str,
    ) -> Result<Vec<Arc<dyn MetricAdapter>>, RunnerError> {
        let adapters = self
            .canonical_names(names)
            .iter()
            .map(|name| self.registry.get(name))
            .collect::<Result<Vec<_>, _>>()?;
        // Unsupported languages are fatal for requested metrics; check all before scoring
        if let Some(unsupported) = adapters.iter().find(|a| !a.language_support(language)) {
            return Err(MetricError::UnsupportedLanguage {
                metric: unsupported.name().to_string(),
                language: language.to_string(),
            }
            .into());
        }
        Ok(adapters)
    }

    /// Filter, score, bootstrap and report
    ///
    /// # Errors
    ///
    /// Returns an error if filtering fails, a metric is unknown, unsupported
    /// or fails, or bootstrap fails.
    pub fn run(&self, corpus: &AlignedCorpus) -> Result<ComparisonOutcome, RunnerError> {
        let names = self.config.ordered_metrics();
        let adapters = self.resolve_metrics(&names, corpus.target_language())?;
        if let Some(segment) = adapters.first() {
            if !segment.segment_level() {
                return Err(RunnerError::NotSegmentLevel(segment.name().to_string()));
            }
        }

        let filtered = self.build_pipeline()?.apply(corpus)?;
        let summary = CorpusSummary::from_outcome(&filtered);
        tracing::info!("{}", summary.reduction_message());

        let pairwise = self.compare_all(&adapters, &filtered.corpus)?;

        let bootstrap_config = BootstrapConfig::from(&self.config.bootstrap);
        let mut bootstrap = Vec::new();
        if bootstrap_config.is_enabled() {
            let engine = BootstrapEngine::new(bootstrap_config)?;
            for (adapter, result) in adapters.iter().zip(&pairwise) {
                bootstrap.push(engine.run(&filtered.corpus, adapter.as_ref(), Some(result))?);
            }
        } else {
            tracing::info!("Bootstrap disabled");
        }

        let mut builder = ReportBuilder::new(corpus.languages().clone())
            .with_alpha(self.config.alpha)
            .with_corpus(summary)
            .with_buckets(
                pairwise
                    .first()
                    .and_then(|r| BucketAnalysis::from_pairwise(r, self.config.quality_thresholds)),
            );
        if bootstrap_config.is_enabled() {
            builder = builder.with_bootstrap_config(bootstrap_config);
        }
        for (i, result) in pairwise.iter().enumerate() {
            builder.add_metric(result, bootstrap.get(i));
        }

        Ok(ComparisonOutcome {
            filtered,
            pairwise,
            bootstrap,
            report: builder.build(),
        })
    }

    /// Score a single system with the configured metrics
    ///
    /// Every metric's language support is checked before any scoring.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric is unknown, does not support the target
    /// language, or fails.
    pub fn score(&self, corpus: &AlignedCorpus) -> Result<ScoreReport, RunnerError> {
        let adapters = self.resolve_metrics(&self.config.metrics, corpus.target_language())?;
        let results = adapters
            .iter()
            .map(|a| a.score(corpus.source(), corpus.hypothesis_x(), corpus.reference()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ScoreReport { results })
    }

    fn compare_all(
        &self,
        adapters: &[Arc<dyn MetricAdapter>],
        corpus: &AlignedCorpus,
    ) -> Result<Vec<PairwiseResult>, RunnerError> {
        let workers = self.config.max_concurrent.clamp(1, adapters.len().max(1));
        if workers == 1 {
            return adapters
                .iter()
                .map(|a| self.comparator.compare(a.as_ref(), corpus).map_err(Into::into))
                .collect();
        }

        let chunk = adapters.len().div_ceil(workers);
        let comparator = &self.comparator;
        thread::scope(|scope| {
            let handles: Vec<_> = adapters
                .chunks(chunk)
                .map(|group| {
                    scope.spawn(move || {
                        group
                            .iter()
                            .map(|a| comparator.compare(a.as_ref(), corpus))
                            .collect::<Result<Vec<_>, _>>()
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(adapters.len());
            for handle in handles {
                results.extend(handle.join().map_err(|_| RunnerError::WorkerPanicked)??);
            }
            Ok(results)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::corpus::LanguagePair;

    fn own(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn corpus_with(languages: LanguagePair) -> AlignedCorpus {
        AlignedCorpus::paired(
            own(&["Paris is big", "Paris is big", "a cat", "the dog", "Berlin"]),
            own(&["r1", "r2", "r3", "x", "r5"]),
            own(&["r1", "y", "y", "y", "r5"]),
            own(&["r1", "r2", "r3", "r4", "r5"]),
            languages,
        )
        .unwrap()
    }

    fn corpus(target: &str) -> AlignedCorpus {
        corpus_with(LanguagePair::for_target(target))
    }

    fn config() -> CompareConfig {
        let mut config = CompareConfig::default();
        config.bootstrap.num_samples = 50;
        config
    }

    #[test]
    fn test_run_default_metrics() {
        let registry = MetricRegistry::with_builtins();
        let runner = ComparisonRunner::new(config(), &registry).unwrap();
        let outcome = runner.run(&corpus("de")).unwrap();

        let names: Vec<&str> = outcome.pairwise.iter().map(PairwiseResult::metric).collect();
        assert_eq!(names, vec!["ZeroEdit", "LengthRatio"]);
        assert_eq!(outcome.pairwise[0].system_scores(), (0.8, 0.4));
        assert_eq!(outcome.bootstrap.len(), 2);
        assert_eq!(outcome.report.metrics.len(), 2);
        assert!(outcome.report.quality_buckets.is_some());
        assert_eq!(outcome.filtered.reduction_ratio, 0.0);
    }

    #[test]
    fn test_segment_metric_matched_case_insensitively() {
        let registry = MetricRegistry::with_builtins();
        let mut cfg = config();
        cfg.segment_metric = "zeroedit".to_string();
        cfg.metrics = own(&["ZeroEdit", "lengthratio", "LengthRatio"]);
        let outcome = ComparisonRunner::new(cfg, &registry)
            .unwrap()
            .run(&corpus("de"))
            .unwrap();

        let names: Vec<&str> = outcome.pairwise.iter().map(PairwiseResult::metric).collect();
        assert_eq!(names, vec!["ZeroEdit", "LengthRatio"]);
        assert_eq!(outcome.bootstrap.len(), 2);
        assert_eq!(outcome.report.significance.len(), 1);

        let results: serde_json::Value =
            serde_json::from_str(&outcome.report.results_json().unwrap()).unwrap();
        assert_eq!(results.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_run_with_filters() {
        let registry = MetricRegistry::with_builtins();
        let mut cfg = config();
        cfg.filters = vec![FilterKind::Duplicates, FilterKind::NamedEntities];
        let runner = ComparisonRunner::new(cfg, &registry)
            .unwrap()
            .with_detector(Arc::new(GazetteerDetector::new(
                vec!["Paris", "Berlin"],
                vec!["en"],
            )));
        // English source side is inspected
        let outcome = runner.run(&corpus_with(LanguagePair::new("en", "de"))).unwrap();
        assert_eq!(outcome.filtered.corpus.len(), 2);
        assert!((outcome.report.corpus.reduction_percent - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_ner_skipped_for_unsupported_language() {
        let registry = MetricRegistry::with_builtins();
        let mut cfg = config();
        cfg.filters = vec![FilterKind::NamedEntities];
        let runner = ComparisonRunner::new(cfg, &registry)
            .unwrap()
            .with_detector(Arc::new(GazetteerDetector::new(vec!["Paris"], vec!["de"])));
        let outcome = runner.run(&corpus("ja")).unwrap();
        assert_eq!(outcome.filtered.skipped(), vec!["named-entities"]);
        assert_eq!(outcome.filtered.corpus.len(), 5);
    }

    #[test]
    fn test_missing_glossary() {
        let registry = MetricRegistry::with_builtins();
        let mut cfg = config();
        cfg.filters = vec![FilterKind::Terminology];
        let runner = ComparisonRunner::new(cfg, &registry).unwrap();
        assert!(matches!(
            runner.run(&corpus("de")),
            Err(RunnerError::MissingFilterInput { .. })
        ));
    }

    #[test]
    fn test_glossary_without_matches_fails_at_metric() {
        let dir = tempfile::tempdir().unwrap();
        let glossary = dir.path().join("terms.txt");
        fs::write(&glossary, "nothing-matches\n").unwrap();

        let registry = MetricRegistry::with_builtins();
        let mut cfg = config();
        cfg.filters = vec![FilterKind::Terminology];
        cfg.glossary = Some(glossary);
        let runner = ComparisonRunner::new(cfg, &registry).unwrap();
        assert!(matches!(
            runner.run(&corpus("de")),
            Err(RunnerError::Comparator(ComparatorError::Metric(
                MetricError::EmptyCorpus { .. }
            )))
        ));
    }

    #[test]
    fn test_corpus_level_segment_metric_rejected() {
        let registry = MetricRegistry::with_builtins();
        let mut cfg = config();
        cfg.segment_metric = "LengthRatio".to_string();
        let runner = ComparisonRunner::new(cfg, &registry).unwrap();
        assert!(matches!(
            runner.run(&corpus("de")),
            Err(RunnerError::NotSegmentLevel(_))
        ));
    }

    #[test]
    fn test_bootstrap_disabled() {
        let registry = MetricRegistry::with_builtins();
        let mut cfg = config();
        cfg.bootstrap.num_samples = 0;
        let outcome = ComparisonRunner::new(cfg, &registry)
            .unwrap()
            .run(&corpus("de"))
            .unwrap();
        assert!(outcome.bootstrap.is_empty());
        assert!(outcome.report.metadata.bootstrap.is_none());
        assert!(outcome.report.metrics.iter().all(|m| m.bootstrap.is_none()));
    }

    #[test]
    fn test_concurrent_matches_sequential() {
        let registry = MetricRegistry::with_builtins();
        let sequential = ComparisonRunner::new(config(), &registry)
            .unwrap()
            .run(&corpus("de"))
            .unwrap();
        let mut cfg = config();
        cfg.max_concurrent = 4;
        let concurrent = ComparisonRunner::new(cfg, &registry)
            .unwrap()
            .run(&corpus("de"))
            .unwrap();
        assert_eq!(sequential.pairwise, concurrent.pairwise);
        assert_eq!(sequential.bootstrap, concurrent.bootstrap);
    }

    #[test]
    fn test_unsupported_metric_language_is_fatal() {
        let registry = MetricRegistry::with_builtins();
        let mut cfg = config();
        cfg.external_metrics = vec![crate::config::ExternalMetricConfig {
            name: "GermanOnly".to_string(),
            command: "true".to_string(),
            args: String::new(),
            segment_level: false,
            system_score_is_segment_mean: false,
            languages: vec!["de".to_string()],
            timeout_secs: 5,
        }];
        cfg.metrics = vec!["ZeroEdit".to_string(), "GermanOnly".to_string()];
        let runner = ComparisonRunner::new(cfg, &registry).unwrap();
        assert!(matches!(
            runner.score(&corpus("fr")),
            Err(RunnerError::Metric(MetricError::UnsupportedLanguage { .. }))
        ));
        assert!(matches!(
            runner.run(&corpus("fr")),
            Err(RunnerError::Metric(MetricError::UnsupportedLanguage { .. }))
        ));
    }

    #[test]
    fn test_score_single_system() {
        let registry = MetricRegistry::with_builtins();
        let runner = ComparisonRunner::new(config(), &registry).unwrap();
        let single = AlignedCorpus::single(
            own(&["s1", "s2"]),
            own(&["a", "b"]),
            own(&["a", "c"]),
            LanguagePair::for_target("de"),
        )
        .unwrap();
        let report = runner.score(&single).unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].system_score, 0.5);
    }

    #[test]
    fn test_write_outputs() {
        let registry = MetricRegistry::with_builtins();
        let outcome = ComparisonRunner::new(config(), &registry)
            .unwrap()
            .run(&corpus("de"))
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let written = outcome.write_to(&dir.path().join("out")).unwrap();
        assert_eq!(written.len(), 3);

        let results: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(results["ZeroEdit"]["x"], 0.8);
        assert!(results["LengthRatio"]["x_wins_pct"].is_number());
    }
}

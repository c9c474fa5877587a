//! Run configuration loaded from YAML.
//!
//! Every field has a default, so an empty document is a valid configuration.
//! Command-line flags override values read from the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Corpus filters selectable by name
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Keep the first occurrence of each source sentence
    Duplicates,
    /// Keep segments within a reference-length percentile range
    Length,
    /// Keep segments containing a named entity
    NamedEntities,
    /// Keep segments containing a glossary term
    Terminology,
}

impl std::str::FromStr for FilterKind {
    type Err = ConfigError;

    /// Parse a filter name
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidFilter` for unknown names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "duplicates" | "dedup" => Ok(Self::Duplicates),
            "length" => Ok(Self::Length),
            "named-entities" | "ner" => Ok(Self::NamedEntities),
            "terminology" | "glossary" => Ok(Self::Terminology),
            _ => Err(ConfigError::InvalidFilter(s.to_string())),
        }
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Duplicates => "duplicates",
            Self::Length => "length",
            Self::NamedEntities => "named-entities",
            Self::Terminology => "terminology",
        };
        f.write_str(name)
    }
}

/// Bootstrap resampling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BootstrapSettings {
    /// Number of resampling trials; 0 disables bootstrap
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    /// Fraction of the corpus drawn per trial
    #[serde(default = "default_sample_ratio")]
    pub sample_ratio: f64,
    /// Random seed for reproducibility
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Worker threads for trials
    #[serde(default = "default_threads")]
    pub threads: usize,
}

const fn default_num_samples() -> usize {
    300
}
const fn default_sample_ratio() -> f64 {
    0.5
}
const fn default_seed() -> u64 {
    42
}
const fn default_threads() -> usize {
    1
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            num_samples: default_num_samples(),
            sample_ratio: default_sample_ratio(),
            seed: default_seed(),
            threads: default_threads(),
        }
    }
}

/// External scorer definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalMetricConfig {
    /// Metric name used in reports and on the command line
    pub name: String,
    /// Executable to invoke
    pub command: String,
    /// Argument template with `{src}`, `{hyp}`, `{ref}` placeholders
    #[serde(default = "default_args")]
    pub args: String,
    /// Whether the scorer prints per-segment scores
    #[serde(default)]
    pub segment_level: bool,
    /// Whether the system score is the mean of the segment scores
    #[serde(default)]
    pub system_score_is_segment_mean: bool,
    /// Supported target languages (empty means all)
    #[serde(default)]
    pub languages: Vec<String>,
    /// Timeout per invocation in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[allow(clippy::literal_string_with_formatting_args)]
fn default_args() -> String {
    "{ref} {hyp}".to_string()
}

const fn default_timeout_secs() -> u64 {
    600
}

/// Full comparison configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompareConfig {
    /// Metrics to compute, in table order
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
    /// Segment-level metric placed first and used for bucket analysis
    #[serde(default = "default_segment_metric")]
    pub segment_metric: String,
    /// Filters, in application order
    #[serde(default)]
    pub filters: Vec<FilterKind>,
    /// Percentile range for the length filter
    #[serde(default = "default_length_range")]
    pub length_range: (u32, u32),
    /// Glossary file for the terminology filter
    #[serde(default)]
    pub glossary: Option<PathBuf>,
    /// Entity gazetteer for the named-entity filter
    #[serde(default)]
    pub entities: Option<PathBuf>,
    /// Fail instead of skipping filters that do not support the languages
    #[serde(default)]
    pub strict_filters: bool,
    /// Bootstrap settings
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
    /// Critical / major / minor thresholds for quality buckets
    #[serde(default = "default_quality_thresholds")]
    pub quality_thresholds: [f64; 3],
    /// Significance level for the paired t-test
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Metric comparisons to run concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// External scorers to register
    #[serde(default)]
    pub external_metrics: Vec<ExternalMetricConfig>,
    /// Persistent score cache directory (in-memory only when unset)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_metrics() -> Vec<String> {
    vec!["ZeroEdit".to_string(), "LengthRatio".to_string()]
}

fn default_segment_metric() -> String {
    "ZeroEdit".to_string()
}

const fn default_length_range() -> (u32, u32) {
    (0, 100)
}

const fn default_quality_thresholds() -> [f64; 3] {
    [0.0, 0.3, 0.6]
}

const fn default_alpha() -> f64 {
    0.05
}

const fn default_max_concurrent() -> usize {
    1
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            metrics: default_metrics(),
            segment_metric: default_segment_metric(),
            filters: Vec::new(),
            length_range: default_length_range(),
            glossary: None,
            entities: None,
            strict_filters: false,
            bootstrap: BootstrapSettings::default(),
            quality_thresholds: default_quality_thresholds(),
            alpha: default_alpha(),
            max_concurrent: default_max_concurrent(),
            external_metrics: Vec::new(),
            cache_dir: None,
        }
    }
}

impl CompareConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or fails validation.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for out-of-range settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.bootstrap.sample_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "bootstrap.sample_ratio",
                message: format!("{ratio} is not in (0, 1]"),
            });
        }
        let (min, max) = self.length_range;
        if max > 100 || min > max {
            return Err(ConfigError::InvalidValue {
                field: "length_range",
                message: format!("[{min}, {max}] is not a range within [0, 100]"),
            });
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "alpha",
                message: format!("{} is not in (0, 1)", self.alpha),
            });
        }
        let [critical, major, minor] = self.quality_thresholds;
        if !(critical <= major && major <= minor) {
            return Err(ConfigError::InvalidValue {
                field: "quality_thresholds",
                message: "thresholds must be ascending (critical, major, minor)".to_string(),
            });
        }
        if let Some(external) = self.external_metrics.iter().find(|m| m.name.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "external_metrics.name",
                message: format!("scorer '{}' has no name", external.command),
            });
        }
        Ok(())
    }

    /// Metric list with the segment metric moved to the front
    #[must_use]
    pub fn ordered_metrics(&self) -> Vec<String> {
        let mut ordered = vec![self.segment_metric.clone()];
        ordered.extend(
            self.metrics
                .iter()
                .filter(|m| **m != self.segment_metric)
                .cloned(),
        );
        ordered
    }
}

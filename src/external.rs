//! Metrics backed by external scorer commands.
//!
//! The corpus is written to temporary line files and the command is invoked
//! with `{src}`, `{hyp}` and `{ref}` in its argument template replaced by the
//! file paths. The scorer prints either a JSON object
//! `{"system_score": f64, "segment_scores": [f64, ...]}` or a single number
//! on stdout.

use crate::config::ExternalMetricConfig;
use crate::metrics::{check_input, MetricAdapter, MetricError, MetricResult};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Deserialize)]
struct ScorerOutput {
    system_score: f64,
    #[serde(default)]
    segment_scores: Option<Vec<f64>>,
}

/// Metric adapter that shells out to a scorer command
#[derive(Debug, Clone)]
pub struct CommandMetric {
    config: ExternalMetricConfig,
    timeout: Duration,
}

impl CommandMetric {
    /// Create an adapter from its configuration
    #[must_use]
    pub fn new(config: ExternalMetricConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self { config, timeout }
    }

    /// Override the invocation timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if the scorer command is installed
    #[must_use]
    pub fn is_available(&self) -> bool {
        Command::new("which")
            .arg(&self.config.command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    fn invocation_error(&self, message: impl Into<String>) -> MetricError {
        MetricError::Invocation {
            metric: self.config.name.clone(),
            message: message.into(),
        }
    }

    fn build_args(&self, dir: &Path) -> Result<Vec<String>, MetricError> {
        let quoted = |file: &str| shell_words::quote(&dir.join(file).to_string_lossy()).into_owned();

        #[allow(clippy::literal_string_with_formatting_args)]
        let args = self
            .config
            .args
            .replace("{src}", &quoted("src.txt"))
            .replace("{hyp}", &quoted("hyp.txt"))
            .replace("{ref}", &quoted("ref.txt"));

        shell_words::split(&args)
            .map_err(|e| self.invocation_error(format!("invalid argument template: {e}")))
    }

    fn run(&self, args: &[String]) -> Result<String, MetricError> {
        let start = Instant::now();
        let mut child = Command::new(&self.config.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.invocation_error(format!("cannot start '{}': {e}", self.config.command)))?;

        // Drain both pipes off-thread so a chatty scorer cannot block on a full pipe
        let stdout = child.stdout.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                pipe.read_to_string(&mut buf).map(|_| buf)
            })
        });
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                pipe.read_to_string(&mut buf).map(|_| buf)
            })
        });

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MetricError::Timeout {
                    metric: self.config.name.clone(),
                    seconds: self.timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let collect = |handle: Option<thread::JoinHandle<std::io::Result<String>>>| -> Result<String, MetricError> {
            match handle {
                Some(h) => Ok(h
                    .join()
                    .map_err(|_| self.invocation_error("output reader panicked"))??),
                None => Ok(String::new()),
            }
        };
        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;

        tracing::debug!(
            metric = %self.config.name,
            elapsed_ms = start.elapsed().as_millis(),
            status = %status,
            "External scorer finished"
        );

        if !status.success() {
            return Err(self.invocation_error(format!("{status}: {}", stderr.trim())));
        }
        Ok(stdout)
    }

    fn parse_output(&self, stdout: &str) -> Result<ScorerOutput, MetricError> {
        let trimmed = stdout.trim();
        if let Ok(output) = serde_json::from_str::<ScorerOutput>(trimmed) {
            return Ok(output);
        }
        trimmed
            .parse::<f64>()
            .map(|system_score| ScorerOutput {
                system_score,
                segment_scores: None,
            })
            .map_err(|_| self.invocation_error(format!("unrecognised scorer output: {trimmed:?}")))
    }
}

impl MetricAdapter for CommandMetric {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn segment_level(&self) -> bool {
        self.config.segment_level
    }

    fn system_score_is_segment_mean(&self) -> bool {
        self.config.segment_level && self.config.system_score_is_segment_mean
    }

    fn language_support(&self, language: &str) -> bool {
        self.config.languages.is_empty() || self.config.languages.iter().any(|l| l == language)
    }

    fn identity(&self) -> String {
        let config = &self.config;
        let mut hasher = Sha256::new();
        for part in [
            config.command.as_str(),
            config.args.as_str(),
            &config.languages.join(","),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([
            u8::from(config.segment_level),
            u8::from(config.system_score_is_segment_mean),
        ]);
        format!("{}#{:x}", config.name, hasher.finalize())
    }

    fn score(
        &self,
        sources: &[String],
        hypotheses: &[String],
        references: &[String],
    ) -> Result<MetricResult, MetricError> {
        check_input(&self.config.name, sources, hypotheses, references)?;
        // One segment per line in the scorer's input files
        for (field, lines) in [
            ("sources", sources),
            ("hypotheses", hypotheses),
            ("references", references),
        ] {
            let broken = lines
                .iter()
                .position(|l| l.contains(|c: char| c == '\n' || c == '\r'));
            if let Some(i) = broken {
                return Err(
                    self.invocation_error(format!("{field} segment {i} contains a line break"))
                );
            }
        }

        let dir = tempfile::tempdir()?;
        for (file, lines) in [("src.txt", sources), ("hyp.txt", hypotheses), ("ref.txt", references)] {
            fs::write(dir.path().join(file), lines.join("\n") + "\n")?;
        }

        let args = self.build_args(dir.path())?;
        tracing::info!(
            metric = %self.config.name,
            command = %self.config.command,
            segments = hypotheses.len(),
            "Invoking external scorer"
        );
        let stdout = self.run(&args)?;
        let output = self.parse_output(&stdout)?;

        let segment_scores = if self.config.segment_level {
            Some(output.segment_scores.ok_or_else(|| {
                self.invocation_error("segment-level scorer did not print segment_scores")
            })?)
        } else {
            None
        };

        MetricResult::new(
            self.config.name.clone(),
            output.system_score,
            segment_scores,
            sources,
            hypotheses,
            references,
        )
    }
}

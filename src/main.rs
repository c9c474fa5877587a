//! mt-pairwise-eval CLI
//!
//! Compare two machine translation systems with paired bootstrap resampling.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mt_pairwise_eval::{
    registry, AlignedCorpus, CompareConfig, ComparisonRunner, FilterKind, LanguagePair,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mt-pairwise-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare system X against system Y
    Compare {
        /// Source file, one segment per line
        #[arg(short, long)]
        source: PathBuf,

        /// System X translations
        #[arg(short = 'x', long)]
        system_x: PathBuf,

        /// System Y translations
        #[arg(short = 'y', long)]
        system_y: PathBuf,

        /// Reference translations
        #[arg(short, long)]
        reference: PathBuf,

        /// Target language code, or a full `src-trg` pair
        #[arg(short, long)]
        language: String,

        /// Metrics to compute (defaults to the configuration)
        #[arg(short, long)]
        metric: Vec<String>,

        /// Segment-level metric shown first and used for error buckets
        #[arg(long)]
        seg_metric: Option<String>,

        /// Filters to apply, in order
        #[arg(short, long)]
        filter: Vec<FilterKind>,

        /// Skip filters that do not support the language pair instead of failing
        #[arg(long)]
        lenient_filters: bool,

        /// Lower length percentile for the length filter
        #[arg(long)]
        length_min: Option<u32>,

        /// Upper length percentile for the length filter
        #[arg(long)]
        length_max: Option<u32>,

        /// Glossary for the terminology filter
        #[arg(long)]
        glossary: Option<PathBuf>,

        /// Entity list for the named-entity filter
        #[arg(long)]
        entities: Option<PathBuf>,

        /// Run bootstrap resampling
        #[arg(short, long)]
        bootstrap: bool,

        /// Number of bootstrap trials
        #[arg(long)]
        num_splits: Option<usize>,

        /// Fraction of the corpus drawn per trial
        #[arg(long)]
        sample_ratio: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Bootstrap worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Persistent score cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Directory for results.json and reports
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format on stdout
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Score a single system
    Score {
        /// Source file, one segment per line
        #[arg(short, long)]
        source: PathBuf,

        /// System translations
        #[arg(short = 't', long)]
        translation: PathBuf,

        /// Reference translations
        #[arg(short, long)]
        reference: PathBuf,

        /// Target language code, or a full `src-trg` pair
        #[arg(short, long)]
        language: String,

        /// Metrics to compute (defaults to the configuration)
        #[arg(short, long)]
        metric: Vec<String>,

        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List available metrics
    Metrics {
        /// YAML configuration file with external metrics
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Compare {
            source,
            system_x,
            system_y,
            reference,
            language,
            metric,
            seg_metric,
            filter,
            lenient_filters,
            length_min,
            length_max,
            glossary,
            entities,
            bootstrap,
            num_splits,
            sample_ratio,
            seed,
            threads,
            config,
            cache_dir,
            output,
            format,
        } => {
            let from_file = config.is_some();
            let mut cfg = load_config(config.as_deref())?;
            if !metric.is_empty() {
                cfg.metrics = metric;
            }
            if let Some(seg_metric) = seg_metric {
                cfg.segment_metric = seg_metric;
            }
            if !filter.is_empty() {
                cfg.filters = filter;
                cfg.strict_filters = true;
            }
            if lenient_filters {
                cfg.strict_filters = false;
            }
            cfg.length_range = (
                length_min.unwrap_or(cfg.length_range.0),
                length_max.unwrap_or(cfg.length_range.1),
            );
            cfg.glossary = glossary.or(cfg.glossary);
            cfg.entities = entities.or(cfg.entities);
            cfg.cache_dir = cache_dir.or(cfg.cache_dir);
            if !bootstrap && !from_file {
                cfg.bootstrap.num_samples = 0;
            }
            if let Some(n) = num_splits {
                cfg.bootstrap.num_samples = n;
            }
            if let Some(ratio) = sample_ratio {
                cfg.bootstrap.sample_ratio = ratio;
            }
            if let Some(seed) = seed {
                cfg.bootstrap.seed = seed;
            }
            if let Some(threads) = threads {
                cfg.bootstrap.threads = threads;
            }

            let corpus = AlignedCorpus::from_files(
                &source,
                &system_x,
                Some(&system_y),
                &reference,
                parse_languages(&language)?,
            )
            .context("failed to load corpus")?;
            tracing::info!(
                segments = corpus.len(),
                languages = %corpus.languages(),
                metrics = ?cfg.ordered_metrics(),
                filters = ?cfg.filters,
                "Starting comparison"
            );

            let runner = ComparisonRunner::new(cfg, registry::global())?;
            let outcome = runner.run(&corpus)?;

            eprintln!("{}", outcome.report.corpus.reduction_message());
            match format {
                OutputFormat::Text => println!("{}", outcome.report.to_text()),
                OutputFormat::Markdown => println!("{}", outcome.report.to_markdown()),
                OutputFormat::Json => println!("{}", outcome.report.results_json()?),
            }

            if let Some(dir) = output {
                for path in outcome.write_to(&dir)? {
                    eprintln!("Wrote {}", path.display());
                }
            }
        }
        Commands::Score {
            source,
            translation,
            reference,
            language,
            metric,
            config,
            json,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if !metric.is_empty() {
                cfg.metrics = metric;
            }
            let corpus = AlignedCorpus::from_files(
                &source,
                &translation,
                None::<&PathBuf>,
                &reference,
                parse_languages(&language)?,
            )
            .context("failed to load corpus")?;

            let runner = ComparisonRunner::new(cfg, registry::global())?;
            let report = runner.score(&corpus)?;
            if json {
                println!("{}", report.to_json()?);
            } else {
                println!("{}", report.to_text());
            }
        }
        Commands::Metrics { config } => {
            let cfg = load_config(config.as_deref())?;
            let registry = registry::global();
            for external in &cfg.external_metrics {
                registry.register_external(external.clone());
            }
            for name in registry.names() {
                let adapter = registry.get(&name)?;
                let level = if adapter.segment_level() {
                    "segment"
                } else {
                    "corpus"
                };
                println!("{name:<20} {level}");
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<CompareConfig> {
    path.map_or_else(
        || Ok(CompareConfig::default()),
        |p| {
            CompareConfig::load(p)
                .with_context(|| format!("failed to load configuration {}", p.display()))
        },
    )
}

fn parse_languages(language: &str) -> Result<LanguagePair> {
    if language.contains('-') {
        Ok(language.parse()?)
    } else {
        Ok(LanguagePair::for_target(language))
    }
}

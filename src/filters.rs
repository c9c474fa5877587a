//! Corpus filters.
//!
//! A [`Filter`] inspects an [`AlignedCorpus`] and returns the indices of the
//! segments to keep, in corpus order. Filters never build corpora themselves;
//! [`crate::pipeline::FilterPipeline`] materialises the kept indices between
//! stages.

use crate::corpus::AlignedCorpus;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Languages for which named-entity filtering is offered
pub const NER_LANGUAGES: [&str; 8] = ["ar", "zh", "nl", "en", "fr", "de", "ru", "uk"];

/// Number of equal-frequency length buckets
pub const LENGTH_BUCKETS: usize = 20;

/// Width of one length bucket in percentiles
pub const BUCKET_WIDTH: u32 = 5;

/// Errors that can occur while applying filters
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Filter `{filter}` does not support language pair {source_language}-{target_language}")]
    UnsupportedLanguage {
        filter: String,
        source_language: String,
        target_language: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Selects segments of a corpus
pub trait Filter: Send + Sync {
    /// Stable filter name (used in logs and configuration)
    fn name(&self) -> &str;

    /// Whether the filter can run on this corpus at all
    fn is_applicable(&self, _corpus: &AlignedCorpus) -> bool {
        true
    }

    /// Indices of the segments to keep, ascending
    ///
    /// # Errors
    ///
    /// Returns `FilterError::UnsupportedLanguage` when the filter cannot
    /// handle the corpus languages.
    fn apply(&self, corpus: &AlignedCorpus) -> Result<Vec<usize>, FilterError>;
}

// ============================================================================
// Duplicates
// ============================================================================

/// Keeps only the first occurrence of each distinct source sentence
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicatesFilter;

impl Filter for DuplicatesFilter {
    fn name(&self) -> &str {
        "duplicates"
    }

    fn apply(&self, corpus: &AlignedCorpus) -> Result<Vec<usize>, FilterError> {
        let mut seen = HashSet::with_capacity(corpus.len());
        Ok(corpus
            .source()
            .iter()
            .enumerate()
            .filter(|(_, src)| seen.insert(src.as_str()))
            .map(|(i, _)| i)
            .collect())
    }
}

// ============================================================================
// Length
// ============================================================================

/// Keeps segments whose reference length falls in a percentile range
///
/// Reference lengths (in characters) are ranked, ties broken by corpus order,
/// and split into 20 equal-frequency buckets labelled `0, 5, ..., 95`. A
/// segment is kept when its bucket label lies in `[min_percentile, max_percentile]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthFilter {
    min_percentile: u32,
    max_percentile: u32,
}

impl LengthFilter {
    /// Create a length filter for the inclusive percentile range
    #[must_use]
    pub const fn new(min_percentile: u32, max_percentile: u32) -> Self {
        Self {
            min_percentile,
            max_percentile,
        }
    }

    /// Whether this range keeps every segment
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.min_percentile == 0 && self.max_percentile >= 95
    }

    /// Lower bound of the range
    #[must_use]
    pub const fn min_percentile(&self) -> u32 {
        self.min_percentile
    }

    /// Upper bound of the range
    #[must_use]
    pub const fn max_percentile(&self) -> u32 {
        self.max_percentile
    }
}

impl Default for LengthFilter {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

impl Filter for LengthFilter {
    fn name(&self) -> &str {
        "length"
    }

    fn apply(&self, corpus: &AlignedCorpus) -> Result<Vec<usize>, FilterError> {
        let lengths: Vec<usize> = corpus
            .reference()
            .iter()
            .map(|r| r.chars().count())
            .collect();

        Ok(length_buckets(&lengths)
            .into_iter()
            .enumerate()
            .filter(|(_, bucket)| (self.min_percentile..=self.max_percentile).contains(bucket))
            .map(|(i, _)| i)
            .collect())
    }
}

/// Assign each length to an equal-frequency percentile bucket
///
/// Lengths are ranked `1..=n` with ties broken by position. Bucket edges sit at
/// the 0th, 5th, ..., 100th percentile of the ranks; each bucket is closed on
/// the right and the first bucket also contains its left edge. The returned
/// label is the bucket's lower percentile bound. A single-element input falls
/// into bucket `0`.
#[must_use]
pub fn length_buckets(lengths: &[usize]) -> Vec<u32> {
    let n = lengths.len();
    if n <= 1 {
        return vec![0; n];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| (lengths[i], i));

    let mut buckets = vec![0_u32; n];
    for (position, &index) in order.iter().enumerate() {
        // rank - 1 == position; edge k sits at rank 1 + (n - 1) * k / 20
        let bucket = if position == 0 {
            0
        } else {
            let upper_edge = (position * LENGTH_BUCKETS).div_ceil(n - 1);
            upper_edge.clamp(1, LENGTH_BUCKETS) - 1
        };
        #[allow(clippy::cast_possible_truncation)]
        let label = bucket as u32 * BUCKET_WIDTH;
        buckets[index] = label;
    }
    buckets
}

// ============================================================================
// Named entities
// ============================================================================

/// External named-entity recognition capability
pub trait EntityDetector: Send + Sync {
    /// Whether `text` in `language` contains at least one named entity
    fn has_named_entity(&self, text: &str, language: &str) -> bool;

    /// Languages this detector can handle
    fn supported_languages(&self) -> BTreeSet<String>;
}

/// Which side of the corpus the NER filter inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectedSide {
    /// Source segments, in the source language
    Source,
    /// Reference segments, in the target language
    Reference,
}

/// Keeps segments that mention at least one named entity
pub struct NerFilter {
    detector: Arc<dyn EntityDetector>,
    allowed: BTreeSet<String>,
}

impl NerFilter {
    /// Create a NER filter restricted to [`NER_LANGUAGES`]
    #[must_use]
    pub fn new(detector: Arc<dyn EntityDetector>) -> Self {
        Self::with_languages(detector, NER_LANGUAGES)
    }

    /// Create a NER filter with a custom language allowlist
    #[must_use]
    pub fn with_languages<I, S>(detector: Arc<dyn EntityDetector>, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            detector,
            allowed: languages.into_iter().map(Into::into).collect(),
        }
    }

    fn supports(&self, language: &str) -> bool {
        self.allowed.contains(language) && self.detector.supported_languages().contains(language)
    }

    /// Pick the side and language to inspect, preferring the source
    #[must_use]
    pub fn resolve(&self, corpus: &AlignedCorpus) -> Option<(InspectedSide, String)> {
        if self.supports(corpus.source_language()) {
            Some((InspectedSide::Source, corpus.source_language().to_string()))
        } else if self.supports(corpus.target_language()) {
            Some((InspectedSide::Reference, corpus.target_language().to_string()))
        } else {
            None
        }
    }
}

impl std::fmt::Debug for NerFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NerFilter")
            .field("allowed", &self.allowed)
            .finish_non_exhaustive()
    }
}

impl Filter for NerFilter {
    fn name(&self) -> &str {
        "named-entities"
    }

    fn is_applicable(&self, corpus: &AlignedCorpus) -> bool {
        self.resolve(corpus).is_some()
    }

    fn apply(&self, corpus: &AlignedCorpus) -> Result<Vec<usize>, FilterError> {
        let (side, language) =
            self.resolve(corpus)
                .ok_or_else(|| FilterError::UnsupportedLanguage {
                    filter: self.name().to_string(),
                    source_language: corpus.source_language().to_string(),
                    target_language: corpus.target_language().to_string(),
                })?;

        let segments = match side {
            InspectedSide::Source => corpus.source(),
            InspectedSide::Reference => corpus.reference(),
        };

        Ok(segments
            .iter()
            .enumerate()
            .filter(|(_, text)| self.detector.has_named_entity(text, &language))
            .map(|(i, _)| i)
            .collect())
    }
}

/// Entity detector backed by a list of known entity names
///
/// An entity is detected when it occurs in the text delimited by
/// non-alphanumeric characters (or the text boundaries).
#[derive(Debug, Clone)]
pub struct GazetteerDetector {
    entities: Vec<String>,
    languages: BTreeSet<String>,
}

impl GazetteerDetector {
    /// Create a detector for the given entity names and languages
    #[must_use]
    pub fn new<I, L, S>(entities: I, languages: L) -> Self
    where
        I: IntoIterator<Item = S>,
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entities: entities
                .into_iter()
                .map(Into::into)
                .filter(|e: &String| !e.is_empty())
                .collect(),
            languages: languages.into_iter().map(Into::into).collect(),
        }
    }

    /// Load entity names (one per line) for all [`NER_LANGUAGES`]
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FilterError> {
        let entities = read_term_list(path)?;
        Ok(Self {
            entities,
            languages: NER_LANGUAGES.iter().map(|l| (*l).to_string()).collect(),
        })
    }

    /// Number of known entities
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if no entities are known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityDetector for GazetteerDetector {
    fn has_named_entity(&self, text: &str, _language: &str) -> bool {
        self.entities.iter().any(|entity| {
            text.match_indices(entity.as_str()).any(|(start, m)| {
                let before = text[..start].chars().next_back();
                let after = text[start + m.len()..].chars().next();
                !before.is_some_and(char::is_alphanumeric)
                    && !after.is_some_and(char::is_alphanumeric)
            })
        })
    }

    fn supported_languages(&self) -> BTreeSet<String> {
        self.languages.clone()
    }
}

// ============================================================================
// Terminology
// ============================================================================

/// Keeps segments whose source contains at least one glossary term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminologyFilter {
    glossary: Vec<String>,
}

impl TerminologyFilter {
    /// Create a terminology filter; empty terms are ignored
    #[must_use]
    pub fn new<I, S>(glossary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            glossary: glossary
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    /// Load a glossary file with one term per line
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FilterError> {
        Ok(Self::new(read_term_list(path)?))
    }

    /// Glossary terms
    #[must_use]
    pub fn glossary(&self) -> &[String] {
        &self.glossary
    }
}

impl Filter for TerminologyFilter {
    fn name(&self) -> &str {
        "terminology"
    }

    fn apply(&self, corpus: &AlignedCorpus) -> Result<Vec<usize>, FilterError> {
        Ok(corpus
            .source()
            .iter()
            .enumerate()
            .filter(|(_, src)| self.glossary.iter().any(|term| src.contains(term.as_str())))
            .map(|(i, _)| i)
            .collect())
    }
}

fn read_term_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>, FilterError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::corpus::LanguagePair;

    fn corpus(sources: &[&str], references: &[&str], languages: (&str, &str)) -> AlignedCorpus {
        let own = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        AlignedCorpus::paired(
            own(sources),
            own(references),
            own(references),
            own(references),
            LanguagePair::new(languages.0, languages.1),
        )
        .unwrap()
    }

    fn uniform(n: usize) -> AlignedCorpus {
        let refs: Vec<String> = (0..n).map(|i| "r".repeat(i + 1)).collect();
        let refs: Vec<&str> = refs.iter().map(String::as_str).collect();
        corpus(&refs, &refs, ("de", "en"))
    }

    // =========================================================================
    // DuplicatesFilter
    // =========================================================================

    #[test]
    fn test_duplicates_keeps_first_occurrence() {
        let c = corpus(&["A", "A", "B", "A"], &["1", "2", "3", "4"], ("de", "en"));
        assert_eq!(DuplicatesFilter.apply(&c).unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_duplicates_no_duplicates() {
        let c = corpus(&["A", "B", "C"], &["1", "2", "3"], ("de", "en"));
        assert_eq!(DuplicatesFilter.apply(&c).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_duplicates_ignores_other_columns() {
        let c = corpus(&["A", "A"], &["different", "refs"], ("de", "en"));
        assert_eq!(DuplicatesFilter.apply(&c).unwrap(), vec![0]);
    }

    // =========================================================================
    // LengthFilter
    // =========================================================================

    #[test]
    fn test_length_buckets_four_segments() {
        assert_eq!(length_buckets(&[4, 4, 7, 10]), vec![0, 30, 65, 95]);
    }

    #[test]
    fn test_length_buckets_twenty_one_segments() {
        let lengths: Vec<usize> = (0..21).collect();
        let buckets = length_buckets(&lengths);
        assert_eq!(buckets[0], 0);
        assert_eq!(buckets[1], 0);
        assert_eq!(buckets[2], 5);
        assert_eq!(buckets[20], 95);
    }

    #[test]
    fn test_length_buckets_equal_frequency() {
        let lengths: Vec<usize> = (0..100).map(|i| i % 7).collect();
        let buckets = length_buckets(&lengths);
        for label in (0..100).step_by(5) {
            let count = buckets.iter().filter(|&&b| b == label).count();
            assert!((4..=6).contains(&count), "bucket {label} has {count}");
        }
    }

    #[test]
    fn test_length_buckets_identical_lengths() {
        let buckets = length_buckets(&[5; 40]);
        // Ties are broken by position, so the split is still deterministic
        assert_eq!(buckets[0], 0);
        assert_eq!(buckets[39], 95);
        assert_eq!(buckets, length_buckets(&[5; 40]));
    }

    #[test]
    fn test_length_buckets_degenerate_sizes() {
        assert!(length_buckets(&[]).is_empty());
        assert_eq!(length_buckets(&[12]), vec![0]);
    }

    #[test]
    fn test_length_filter_default_is_noop() {
        let c = uniform(37);
        let filter = LengthFilter::default();
        assert!(filter.is_noop());
        assert_eq!(filter.apply(&c).unwrap(), (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn test_length_filter_bottom_quartile() {
        let c = corpus(
            &["a", "b", "c", "d"],
            &["aaaa", "bbbb", "ccccccc", "dddddddddd"],
            ("de", "en"),
        );
        let kept = LengthFilter::new(0, 25).apply(&c).unwrap();
        assert_eq!(kept, vec![0]);
        assert!(!kept.contains(&3));
    }

    #[test]
    fn test_length_filter_top_range() {
        let c = uniform(40);
        let kept = LengthFilter::new(50, 100).apply(&c).unwrap();
        assert_eq!(kept.len(), 20);
        assert!(kept.iter().all(|&i| i >= 20));
    }

    #[test]
    fn test_length_filter_counts_characters() {
        // "ééé" is 3 characters but 6 bytes
        let c = corpus(&["a", "b"], &["ééé", "abcd"], ("de", "en"));
        let kept = LengthFilter::new(0, 0).apply(&c).unwrap();
        assert_eq!(kept, vec![0]);
    }

    #[test]
    fn test_length_filter_inverted_range_keeps_nothing() {
        let c = uniform(10);
        assert!(LengthFilter::new(50, 10).apply(&c).unwrap().is_empty());
    }

    // =========================================================================
    // NerFilter
    // =========================================================================

    fn gazetteer() -> Arc<dyn EntityDetector> {
        Arc::new(GazetteerDetector::new(
            vec!["Lisbon", "Unbabel"],
            NER_LANGUAGES.to_vec(),
        ))
    }

    #[test]
    fn test_ner_inspects_source_when_supported() {
        let c = corpus(
            &["I live in Lisbon", "nothing here", "Unbabel rocks"],
            &["x", "Lisbon", "y"],
            ("en", "ja"),
        );
        let filter = NerFilter::new(gazetteer());
        assert_eq!(filter.resolve(&c).unwrap().0, InspectedSide::Source);
        assert_eq!(filter.apply(&c).unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_ner_falls_back_to_reference() {
        let c = corpus(
            &["I live in Lisbon", "nothing here"],
            &["x", "in Lisbon"],
            ("ja", "en"),
        );
        let filter = NerFilter::new(gazetteer());
        assert_eq!(
            filter.resolve(&c),
            Some((InspectedSide::Reference, "en".to_string()))
        );
        assert_eq!(filter.apply(&c).unwrap(), vec![1]);
    }

    #[test]
    fn test_ner_unsupported_languages() {
        let c = corpus(&["Lisbon"], &["Lisbon"], ("ja", "ko"));
        let filter = NerFilter::new(gazetteer());
        assert!(!filter.is_applicable(&c));
        assert!(matches!(
            filter.apply(&c),
            Err(FilterError::UnsupportedLanguage { .. })
        ));
    }

    #[test]
    fn test_ner_detector_language_restriction() {
        let detector = Arc::new(GazetteerDetector::new(vec!["Lisbon"], vec!["fr"]));
        let c = corpus(&["Lisbon"], &["Lisbon"], ("en", "fr"));
        let filter = NerFilter::new(detector);
        assert_eq!(
            filter.resolve(&c),
            Some((InspectedSide::Reference, "fr".to_string()))
        );
    }

    #[test]
    fn test_gazetteer_word_boundaries() {
        let detector = GazetteerDetector::new(vec!["Rome"], vec!["en"]);
        assert!(detector.has_named_entity("Rome is old", "en"));
        assert!(detector.has_named_entity("to Rome.", "en"));
        assert!(!detector.has_named_entity("Romeo and Juliet", "en"));
        assert!(!detector.has_named_entity("chromeos", "en"));
    }

    #[test]
    fn test_gazetteer_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("entities.txt");
        std::fs::write(&path, "Lisbon\n\n  Porto \n").unwrap();
        let detector = GazetteerDetector::from_file(&path).unwrap();
        assert_eq!(detector.len(), 2);
        assert!(detector.has_named_entity("Porto wine", "en"));
    }

    // =========================================================================
    // TerminologyFilter
    // =========================================================================

    #[test]
    fn test_terminology_substring_match() {
        let c = corpus(
            &["the API key", "a router", "API and router"],
            &["1", "2", "3"],
            ("en", "de"),
        );
        let filter = TerminologyFilter::new(vec!["API", "router"]);
        // Segment matching both terms appears once
        assert_eq!(filter.apply(&c).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_terminology_no_match_is_empty() {
        let c = corpus(&["alpha", "beta"], &["1", "2"], ("en", "de"));
        let filter = TerminologyFilter::new(vec!["gamma"]);
        assert!(filter.apply(&c).unwrap().is_empty());
    }

    #[test]
    fn test_terminology_ignores_empty_terms() {
        let filter = TerminologyFilter::new(vec!["", "term"]);
        assert_eq!(filter.glossary(), &["term".to_string()]);

        let empty = TerminologyFilter::new(Vec::<String>::new());
        let c = corpus(&["alpha"], &["1"], ("en", "de"));
        assert!(empty.apply(&c).unwrap().is_empty());
    }

    #[test]
    fn test_terminology_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("glossary.txt");
        std::fs::write(&path, "cache\nkernel\n").unwrap();
        let filter = TerminologyFilter::from_file(&path).unwrap();
        assert_eq!(filter.glossary().len(), 2);
    }

    #[test]
    fn test_filter_names() {
        assert_eq!(DuplicatesFilter.name(), "duplicates");
        assert_eq!(LengthFilter::default().name(), "length");
        assert_eq!(NerFilter::new(gazetteer()).name(), "named-entities");
        assert_eq!(TerminologyFilter::new(vec!["x"]).name(), "terminology");
    }
}

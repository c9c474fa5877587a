//! Aligned parallel corpus for pairwise MT evaluation.
//!
//! An [`AlignedCorpus`] holds the source segments, the outputs of system X and
//! (in paired mode) system Y, and the references. All present sequences share
//! one length. Filtering and resampling produce new corpora; a corpus is never
//! mutated after construction.

#![allow(clippy::missing_const_for_fn)]

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while building or indexing a corpus
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Mismatched sequence lengths: {field} has {actual} segments, expected {expected}")]
    MismatchedLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid language pair (expected `src-trg`): {0}")]
    InvalidLanguagePair(String),

    #[error("Segment index {index} out of bounds for corpus of {len} segments")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Source and target language codes of a corpus
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    /// Source language code (e.g. `en`)
    pub source: String,
    /// Target language code (e.g. `ru`)
    pub target: String,
}

impl LanguagePair {
    /// Create a language pair from source and target codes
    #[must_use]
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    /// Language pair with an unknown source side (`X-<target>`)
    ///
    /// Used when only the evaluated language is known, as on the compare CLI.
    #[must_use]
    pub fn for_target(target: &str) -> Self {
        Self::new("X", target)
    }
}

impl FromStr for LanguagePair {
    type Err = CorpusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((src, trg)) if !src.is_empty() && !trg.is_empty() && !trg.contains('-') => {
                Ok(Self::new(src, trg))
            }
            _ => Err(CorpusError::InvalidLanguagePair(s.to_string())),
        }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.target)
    }
}

/// One aligned unit of the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Source sentence
    pub source: &'a str,
    /// System X translation
    pub hypothesis_x: &'a str,
    /// System Y translation (absent in single-system mode)
    pub hypothesis_y: Option<&'a str>,
    /// Reference translation
    pub reference: &'a str,
}

/// Parallel sequences of source, system outputs and references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedCorpus {
    source: Vec<String>,
    hypothesis_x: Vec<String>,
    hypothesis_y: Option<Vec<String>>,
    reference: Vec<String>,
    languages: LanguagePair,
}

impl AlignedCorpus {
    /// Build a corpus comparing two systems
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::MismatchedLength` if any sequence length differs
    /// from the number of source segments.
    pub fn paired(
        source: Vec<String>,
        hypothesis_x: Vec<String>,
        hypothesis_y: Vec<String>,
        reference: Vec<String>,
        languages: LanguagePair,
    ) -> Result<Self, CorpusError> {
        Self::build(source, hypothesis_x, Some(hypothesis_y), reference, languages)
    }

    /// Build a corpus scoring a single system
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::MismatchedLength` if any sequence length differs
    /// from the number of source segments.
    pub fn single(
        source: Vec<String>,
        hypothesis: Vec<String>,
        reference: Vec<String>,
        languages: LanguagePair,
    ) -> Result<Self, CorpusError> {
        Self::build(source, hypothesis, None, reference, languages)
    }

    fn build(
        source: Vec<String>,
        hypothesis_x: Vec<String>,
        hypothesis_y: Option<Vec<String>>,
        reference: Vec<String>,
        languages: LanguagePair,
    ) -> Result<Self, CorpusError> {
        let expected = source.len();
        check_length("reference", expected, reference.len())?;
        check_length("hypothesis_x", expected, hypothesis_x.len())?;
        if let Some(y) = &hypothesis_y {
            check_length("hypothesis_y", expected, y.len())?;
        }

        Ok(Self {
            source,
            hypothesis_x,
            hypothesis_y,
            reference,
            languages,
        })
    }

    /// Load a corpus from aligned line-oriented text files
    ///
    /// Passing `None` for system Y loads a single-system corpus.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or line counts disagree.
    pub fn from_files<P: AsRef<Path>>(
        source: P,
        hypothesis_x: P,
        hypothesis_y: Option<P>,
        reference: P,
        languages: LanguagePair,
    ) -> Result<Self, CorpusError> {
        let y = hypothesis_y.map(read_lines).transpose()?;
        Self::build(
            read_lines(source)?,
            read_lines(hypothesis_x)?,
            y,
            read_lines(reference)?,
            languages,
        )
    }

    /// Number of segments
    #[must_use]
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Check if the corpus has no segments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Whether the corpus carries system Y outputs
    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.hypothesis_y.is_some()
    }

    /// Source segments
    #[must_use]
    pub fn source(&self) -> &[String] {
        &self.source
    }

    /// System X outputs
    #[must_use]
    pub fn hypothesis_x(&self) -> &[String] {
        &self.hypothesis_x
    }

    /// System Y outputs, if present
    #[must_use]
    pub fn hypothesis_y(&self) -> Option<&[String]> {
        self.hypothesis_y.as_deref()
    }

    /// Reference segments
    #[must_use]
    pub fn reference(&self) -> &[String] {
        &self.reference
    }

    /// Language pair
    #[must_use]
    pub fn languages(&self) -> &LanguagePair {
        &self.languages
    }

    /// Source language code
    #[must_use]
    pub fn source_language(&self) -> &str {
        &self.languages.source
    }

    /// Target language code
    #[must_use]
    pub fn target_language(&self) -> &str {
        &self.languages.target
    }

    /// Get the aligned segment at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Segment<'_>> {
        if index >= self.len() {
            return None;
        }
        Some(Segment {
            source: &self.source[index],
            hypothesis_x: &self.hypothesis_x[index],
            hypothesis_y: self.hypothesis_y.as_ref().map(|y| y[index].as_str()),
            reference: &self.reference[index],
        })
    }

    /// Iterate over aligned segments in corpus order
    pub fn iter(&self) -> impl Iterator<Item = Segment<'_>> {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    /// Build a new corpus from the segments at `indices`, in the given order
    ///
    /// Indices may repeat, which is how bootstrap samples are materialised.
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::IndexOutOfBounds` for any index `>= len()`.
    pub fn select(&self, indices: &[usize]) -> Result<Self, CorpusError> {
        let len = self.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(CorpusError::IndexOutOfBounds { index, len });
        }

        let pick = |seq: &[String]| -> Vec<String> {
            indices.iter().map(|&i| seq[i].clone()).collect()
        };

        Ok(Self {
            source: pick(&self.source),
            hypothesis_x: pick(&self.hypothesis_x),
            hypothesis_y: self.hypothesis_y.as_deref().map(pick),
            reference: pick(&self.reference),
            languages: self.languages.clone(),
        })
    }

    /// Content fingerprint identifying this corpus for result caching
    ///
    /// Two corpora with the same segments, in the same order, under the same
    /// language pair have the same fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.languages.to_string().as_bytes());
        let mut feed = |name: &str, seq: &[String]| {
            hasher.update(name.as_bytes());
            hasher.update((seq.len() as u64).to_le_bytes());
            for line in seq {
                hasher.update((line.len() as u64).to_le_bytes());
                hasher.update(line.as_bytes());
            }
        };
        feed("src", &self.source);
        feed("x", &self.hypothesis_x);
        if let Some(y) = &self.hypothesis_y {
            feed("y", y);
        }
        feed("ref", &self.reference);
        format!("{:x}", hasher.finalize())
    }

    /// Compute statistics about the corpus
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CorpusStats {
        let segments = self.len();
        let distinct_sources = self
            .source
            .iter()
            .collect::<std::collections::HashSet<_>>()
            .len();
        let avg_chars = |seq: &[String]| {
            if seq.is_empty() {
                0.0
            } else {
                seq.iter().map(|s| s.chars().count()).sum::<usize>() as f64 / seq.len() as f64
            }
        };

        CorpusStats {
            segments,
            distinct_sources,
            avg_source_chars: avg_chars(&self.source),
            avg_reference_chars: avg_chars(&self.reference),
            paired: self.is_paired(),
        }
    }
}

fn check_length(field: &'static str, expected: usize, actual: usize) -> Result<(), CorpusError> {
    if expected == actual {
        Ok(())
    } else {
        Err(CorpusError::MismatchedLength {
            field,
            expected,
            actual,
        })
    }
}

/// Read a line-oriented text file, trimming surrounding whitespace per line
///
/// # Errors
///
/// Returns an IO error if the file cannot be read.
pub fn read_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>, CorpusError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().map(|l| l.trim().to_string()).collect())
}

/// Statistics about a corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusStats {
    /// Number of segments
    pub segments: usize,
    /// Number of distinct source sentences
    pub distinct_sources: usize,
    /// Mean source length in characters
    pub avg_source_chars: f64,
    /// Mean reference length in characters
    pub avg_reference_chars: f64,
    /// Whether system Y outputs are present
    pub paired: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn sample_corpus() -> AlignedCorpus {
        AlignedCorpus::paired(
            strings(&["Hallo Welt", "Guten Morgen", "Danke"]),
            strings(&["Hello world", "Good morning", "Thanks"]),
            strings(&["Hi world", "Good morning", "Thank you"]),
            strings(&["Hello world", "Good morning", "Thank you"]),
            LanguagePair::new("de", "en"),
        )
        .unwrap()
    }

    #[test]
    fn test_paired_corpus_construction() {
        let corpus = sample_corpus();
        assert_eq!(corpus.len(), 3);
        assert!(!corpus.is_empty());
        assert!(corpus.is_paired());
        assert_eq!(corpus.source_language(), "de");
        assert_eq!(corpus.target_language(), "en");
    }

    #[test]
    fn test_mismatched_reference_length() {
        let result = AlignedCorpus::paired(
            strings(&["a", "b"]),
            strings(&["a", "b"]),
            strings(&["a", "b"]),
            strings(&["a"]),
            LanguagePair::new("de", "en"),
        );
        assert!(matches!(
            result,
            Err(CorpusError::MismatchedLength {
                field: "reference",
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_mismatched_system_y_length() {
        let result = AlignedCorpus::paired(
            strings(&["a", "b"]),
            strings(&["a", "b"]),
            strings(&["a", "b", "c"]),
            strings(&["a", "b"]),
            LanguagePair::new("de", "en"),
        );
        assert!(matches!(
            result,
            Err(CorpusError::MismatchedLength {
                field: "hypothesis_y",
                ..
            })
        ));
    }

    #[test]
    fn test_single_system_corpus() {
        let corpus = AlignedCorpus::single(
            strings(&["a", "b"]),
            strings(&["x", "y"]),
            strings(&["r", "s"]),
            LanguagePair::for_target("en"),
        )
        .unwrap();
        assert!(!corpus.is_paired());
        assert!(corpus.hypothesis_y().is_none());
        assert_eq!(corpus.get(1).unwrap().hypothesis_y, None);
        assert_eq!(corpus.languages().to_string(), "X-en");
    }

    #[test]
    fn test_get_segment() {
        let corpus = sample_corpus();
        let segment = corpus.get(2).unwrap();
        assert_eq!(segment.source, "Danke");
        assert_eq!(segment.hypothesis_x, "Thanks");
        assert_eq!(segment.hypothesis_y, Some("Thank you"));
        assert_eq!(segment.reference, "Thank you");
        assert!(corpus.get(3).is_none());
    }

    #[test]
    fn test_select_with_repeats() {
        let corpus = sample_corpus();
        let sub = corpus.select(&[2, 0, 2]).unwrap();
        assert_eq!(sub.len(), 3);
        assert_eq!(sub.source(), &strings(&["Danke", "Hallo Welt", "Danke"])[..]);
        assert_eq!(sub.languages(), corpus.languages());
        // Original corpus untouched
        assert_eq!(corpus.source()[0], "Hallo Welt");
    }

    #[test]
    fn test_select_empty() {
        let corpus = sample_corpus();
        let empty = corpus.select(&[]).unwrap();
        assert!(empty.is_empty());
        assert!(empty.is_paired());
    }

    #[test]
    fn test_select_out_of_bounds() {
        let corpus = sample_corpus();
        let result = corpus.select(&[0, 5]);
        assert!(matches!(
            result,
            Err(CorpusError::IndexOutOfBounds { index: 5, len: 3 })
        ));
    }

    #[test]
    fn test_language_pair_parsing() {
        let pair: LanguagePair = "en-ru".parse().unwrap();
        assert_eq!(pair.source, "en");
        assert_eq!(pair.target, "ru");
        assert!("enru".parse::<LanguagePair>().is_err());
        assert!("-ru".parse::<LanguagePair>().is_err());
        assert!("en-".parse::<LanguagePair>().is_err());
    }

    #[test]
    fn test_fingerprint_stable_and_content_sensitive() {
        let a = sample_corpus();
        let b = sample_corpus();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = a.select(&[0, 1]).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_corpus_stats() {
        let corpus = AlignedCorpus::single(
            strings(&["aa", "aa", "bbbb"]),
            strings(&["x", "y", "z"]),
            strings(&["rr", "rrrr", "rrrrrr"]),
            LanguagePair::new("de", "en"),
        )
        .unwrap();
        let stats = corpus.stats();
        assert_eq!(stats.segments, 3);
        assert_eq!(stats.distinct_sources, 2);
        assert!((stats.avg_reference_chars - 4.0).abs() < f64::EPSILON);
        assert!(!stats.paired);
    }

    #[test]
    fn test_from_files() {
        let dir = TempDir::new().unwrap();
        let write = |name: &str, content: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            path
        };
        let src = write("src.txt", "eins\nzwei  \n");
        let x = write("x.txt", "one\ntwo\n");
        let y = write("y.txt", "one\n two\n");
        let r = write("ref.txt", "one\ntwo\n");

        let corpus =
            AlignedCorpus::from_files(&src, &x, Some(&y), &r, LanguagePair::new("de", "en"))
                .unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.source()[1], "zwei");
        assert_eq!(corpus.hypothesis_y().unwrap()[1], "two");
    }

    #[test]
    fn test_from_files_missing() {
        let result = AlignedCorpus::from_files(
            "/nonexistent/src.txt",
            "/nonexistent/x.txt",
            None,
            "/nonexistent/ref.txt",
            LanguagePair::new("de", "en"),
        );
        assert!(matches!(result, Err(CorpusError::IoError(_))));
    }
}

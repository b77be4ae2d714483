//! Pairwise similarity between normalized field values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::models::FieldId;

pub const DEFAULT_THRESHOLD: f64 = 0.9;

/// String-distance strategy used by the fuzzy method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuzzyAlgorithm {
    /// Optimal String Alignment (restricted Damerau-Levenshtein).
    Osa,
    Levenshtein,
    DamerauLevenshtein,
    /// Jaro-Winkler similarity, used directly as the ratio.
    JaroWinkler,
    /// Levenshtein ratio over whitespace tokens sorted alphabetically.
    TokenSort,
}

impl FuzzyAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Osa => "osa",
            Self::Levenshtein => "levenshtein",
            Self::DamerauLevenshtein => "damerau-levenshtein",
            Self::JaroWinkler => "jaro-winkler",
            Self::TokenSort => "token-sort",
        }
    }

    /// Raw edit distance, or `None` for algorithms that are not distances.
    pub fn distance(self, a: &str, b: &str) -> Option<usize> {
        match self {
            Self::Osa => Some(strsim::osa_distance(a, b)),
            Self::Levenshtein => Some(strsim::levenshtein(a, b)),
            Self::DamerauLevenshtein => Some(strsim::damerau_levenshtein(a, b)),
            Self::TokenSort => Some(strsim::levenshtein(&sorted_tokens(a), &sorted_tokens(b))),
            Self::JaroWinkler => None,
        }
    }

    /// Similarity in [0, 1]. Both inputs must be non-empty.
    pub fn score(self, a: &str, b: &str) -> SimilarityScore {
        if let Self::JaroWinkler = self {
            return SimilarityScore {
                ratio: strsim::jaro_winkler(a, b),
                distance: None,
            };
        }

        let (a, b) = match self {
            Self::TokenSort => (sorted_tokens(a), sorted_tokens(b)),
            _ => (a.to_string(), b.to_string()),
        };
        let distance = match self {
            Self::Osa => strsim::osa_distance(&a, &b),
            Self::DamerauLevenshtein => strsim::damerau_levenshtein(&a, &b),
            _ => strsim::levenshtein(&a, &b),
        };
        let longest = a.chars().count().max(b.chars().count());
        SimilarityScore {
            ratio: edit_ratio(distance, longest),
            distance: Some(distance),
        }
    }
}

impl FromStr for FuzzyAlgorithm {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "osa" => Ok(Self::Osa),
            "lv" | "levenshtein" => Ok(Self::Levenshtein),
            "dl" | "damerau-levenshtein" | "damerau_levenshtein" => Ok(Self::DamerauLevenshtein),
            "jw" | "jaro-winkler" | "jaro_winkler" => Ok(Self::JaroWinkler),
            "token-sort" | "token_sort" => Ok(Self::TokenSort),
            _ => Err(ConfigurationError::InvalidMethod(format!("fuzzy:{s}"))),
        }
    }
}

/// How two normalized values are judged to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MatchMethod {
    Exact,
    Fuzzy(FuzzyAlgorithm),
}

impl Default for MatchMethod {
    fn default() -> Self {
        Self::Fuzzy(FuzzyAlgorithm::Osa)
    }
}

impl FromStr for MatchMethod {
    type Err = ConfigurationError;

    /// Accepts `exact`, `fuzzy` (OSA) and `fuzzy:<algorithm>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        match lower.split_once(':') {
            None if lower == "exact" => Ok(Self::Exact),
            None if lower == "fuzzy" => Ok(Self::Fuzzy(FuzzyAlgorithm::Osa)),
            Some(("fuzzy", algorithm)) => algorithm
                .parse()
                .map(Self::Fuzzy)
                .map_err(|_| ConfigurationError::InvalidMethod(trimmed.to_string())),
            _ => Err(ConfigurationError::InvalidMethod(trimmed.to_string())),
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
            Self::Fuzzy(algorithm) => write!(f, "fuzzy:{}", algorithm.name()),
        }
    }
}

impl TryFrom<String> for MatchMethod {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MatchMethod> for String {
    fn from(value: MatchMethod) -> Self {
        value.to_string()
    }
}

/// Similarity of one pair on one field. `ratio` is 1.0 for identical values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<usize>,
}

/// A pair of records judged to be duplicates, `left < right`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairMatch {
    pub left: usize,
    pub right: usize,
    pub field: FieldId,
    pub score: SimilarityScore,
}

/// Normalized values of one `match_by` field, one slot per record.
#[derive(Debug, Clone)]
pub struct NormalizedColumn {
    pub field: FieldId,
    pub values: Vec<Option<String>>,
}

impl NormalizedColumn {
    pub fn get(&self, row: usize) -> Option<&str> {
        self.values.get(row).and_then(Option::as_deref)
    }
}

/// Match policy: method plus acceptance threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    method: MatchMethod,
    threshold: f64,
}

impl Matcher {
    pub fn new(method: MatchMethod, threshold: f64) -> Result<Self, ConfigurationError> {
        validate_threshold(threshold)?;
        Ok(Self { method, threshold })
    }

    pub fn exact() -> Self {
        Self {
            method: MatchMethod::Exact,
            threshold: 1.0,
        }
    }

    pub fn method(&self) -> MatchMethod {
        self.method
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Similarity of two normalized values. Empty values never score.
    pub fn score(&self, a: &str, b: &str) -> Option<SimilarityScore> {
        if a.is_empty() || b.is_empty() {
            return None;
        }
        Some(match self.method {
            MatchMethod::Exact => SimilarityScore {
                ratio: if a == b { 1.0 } else { 0.0 },
                distance: None,
            },
            MatchMethod::Fuzzy(algorithm) => {
                if a == b {
                    SimilarityScore {
                        ratio: 1.0,
                        distance: (algorithm != FuzzyAlgorithm::JaroWinkler).then_some(0),
                    }
                } else {
                    algorithm.score(a, b)
                }
            }
        })
    }

    /// Score of the pair if it is a match under this policy.
    pub fn compare(&self, a: &str, b: &str) -> Option<SimilarityScore> {
        let score = self.score(a, b)?;
        let accepted = match self.method {
            MatchMethod::Exact => a == b,
            MatchMethod::Fuzzy(_) => score.ratio >= self.threshold,
        };
        accepted.then_some(score)
    }

    /// Compares two records on the first column where both carry a value.
    ///
    /// Columns are in `match_by` order, so a missing primary field falls back
    /// to the next one. Returns `None` when the records share no populated
    /// column or do not match on the one they share.
    pub fn compare_records(
        &self,
        columns: &[NormalizedColumn],
        left: usize,
        right: usize,
    ) -> Option<PairMatch> {
        if left == right {
            return None;
        }
        let (left, right) = (left.min(right), left.max(right));
        columns.iter().find_map(|column| {
            let a = column.get(left)?;
            let b = column.get(right)?;
            Some(self.compare(a, b).map(|score| PairMatch {
                left,
                right,
                field: column.field,
                score,
            }))
        })?
    }
}

pub(crate) fn validate_threshold(threshold: f64) -> Result<(), ConfigurationError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigurationError::ThresholdOutOfRange(threshold));
    }
    Ok(())
}

fn edit_ratio(distance: usize, longest: usize) -> f64 {
    if longest == 0 {
        return 1.0;
    }
    longest.saturating_sub(distance) as f64 / longest as f64
}

fn sorted_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

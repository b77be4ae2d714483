//! Bibliographic record model and duplicate detection.

pub mod blocking;
pub mod cluster;
pub mod config;
pub mod dedup;
pub mod error;
pub mod models;
pub mod normalize;
pub mod similarity;

pub use blocking::Blocking;
pub use config::{AppConfig, LoggingConfig, OutputConfig};
pub use dedup::{
    Cluster, DataQualityWarning, DedupConfig, DeduplicationResult, N_DUPLICATES_FIELD,
    Representative, deduplicate, extract_unique,
};
pub use error::{ConfigurationError, ExitCode, Result, RevkitError};
pub use models::*;
pub use normalize::NormalizerOptions;
pub use similarity::{FuzzyAlgorithm, MatchMethod, Matcher, PairMatch, SimilarityScore};

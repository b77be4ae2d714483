//! Comparison-ready field values.
//!
//! Normalization never touches the record itself: it derives a separate
//! string used only when two records are compared. The same options are
//! applied to every record, so both sides of a comparison always go through
//! the same transform.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::models::{FieldId, RecordTable};

/// Independently toggleable text transforms.
///
/// Applied in a fixed order: diacritics, case, punctuation, whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerOptions {
    pub to_lower: bool,
    pub rm_punctuation: bool,
    pub trim_whitespace: bool,
    pub strip_diacritics: bool,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            to_lower: false,
            rm_punctuation: false,
            trim_whitespace: true,
            strip_diacritics: false,
        }
    }
}

impl NormalizerOptions {
    /// No transform at all: values are compared as imported.
    pub fn identity() -> Self {
        Self {
            to_lower: false,
            rm_punctuation: false,
            trim_whitespace: false,
            strip_diacritics: false,
        }
    }

    pub fn normalize(&self, text: &str) -> String {
        let mut value = if self.strip_diacritics {
            text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
        } else {
            text.to_string()
        };

        if self.to_lower {
            value = value.to_lowercase();
        }

        if self.rm_punctuation {
            value.retain(|c| c.is_alphanumeric() || c.is_whitespace());
        }

        if self.trim_whitespace {
            value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        }

        value
    }

    /// Normalizes one column of `table`. Values that end up empty are `None`,
    /// so a punctuation-only title counts as missing.
    pub fn normalize_column(&self, table: &RecordTable, field: FieldId) -> Vec<Option<String>> {
        (0..table.len())
            .map(|row| {
                table
                    .value(row, field)
                    .map(|raw| self.normalize(raw))
                    .filter(|v| !v.trim().is_empty())
            })
            .collect()
    }
}

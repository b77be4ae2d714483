//! Candidate-pair reduction.
//!
//! Blocking only decides which pairs reach the similarity engine. A pair that
//! is never compared can still end up in one cluster through other matches.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::models::{FieldId, RecordTable};
use crate::normalize::NormalizerOptions;
use crate::similarity::NormalizedColumn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Blocking {
    /// Every pair is compared.
    #[default]
    None,
    /// Records are compared only when the first `length` characters of their
    /// normalized primary `match_by` value agree. Records without a primary
    /// value are compared with everyone so fallback fields still apply.
    Prefix { length: usize },
    /// Records are compared only when their normalized values of every listed
    /// field are equal. Records missing any of them are compared with nobody.
    Fields { fields: Vec<String> },
}

impl Blocking {
    /// Resolves grouping field names against the schema.
    pub fn validate(&self, table: &RecordTable) -> Result<Vec<FieldId>, ConfigurationError> {
        match self {
            Self::None => Ok(Vec::new()),
            Self::Prefix { length: 0 } => Err(ConfigurationError::InvalidBlocking(
                "prefix length must be at least 1".to_string(),
            )),
            Self::Prefix { .. } => Ok(Vec::new()),
            Self::Fields { fields } if fields.is_empty() => Err(
                ConfigurationError::InvalidBlocking("no grouping fields given".to_string()),
            ),
            Self::Fields { fields } => fields
                .iter()
                .map(|name| table.require_field(name))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Compared with every other candidate.
    Open,
    /// Compared within one block.
    Block(usize),
    /// Never compared.
    Excluded,
}

/// Block membership for every record of one run.
#[derive(Debug, Clone)]
pub struct BlockPlan {
    slots: Vec<Slot>,
    blocks: Vec<Vec<usize>>,
    open: Vec<usize>,
}

impl BlockPlan {
    /// `primary` is the normalized first `match_by` column. `group_fields`
    /// come from [`Blocking::validate`].
    pub fn build(
        blocking: &Blocking,
        table: &RecordTable,
        primary: &NormalizedColumn,
        group_fields: &[FieldId],
        normalizer: &NormalizerOptions,
    ) -> Self {
        let keys: Vec<Option<Option<String>>> = match blocking {
            Blocking::None => vec![None; table.len()],
            Blocking::Prefix { length } => (0..table.len())
                .map(|row| {
                    primary
                        .get(row)
                        .map(|value| Some(value.chars().take(*length).collect()))
                })
                .collect(),
            Blocking::Fields { .. } => {
                let columns: Vec<Vec<Option<String>>> = group_fields
                    .iter()
                    .map(|field| normalizer.normalize_column(table, *field))
                    .collect();
                (0..table.len())
                    .map(|row| {
                        let parts: Option<Vec<&str>> = columns
                            .iter()
                            .map(|column| column[row].as_deref())
                            .collect();
                        // Separator cannot occur in normalized text.
                        Some(parts.map(|parts| parts.join("\u{1f}")))
                    })
                    .collect()
            }
        };

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut blocks: Vec<Vec<usize>> = Vec::new();
        let mut open = Vec::new();
        let mut slots = Vec::with_capacity(keys.len());

        for (row, key) in keys.into_iter().enumerate() {
            let slot = match key {
                None => {
                    open.push(row);
                    Slot::Open
                }
                Some(None) => Slot::Excluded,
                Some(Some(key)) => {
                    let block = *index.entry(key).or_insert_with(|| {
                        blocks.push(Vec::new());
                        blocks.len() - 1
                    });
                    blocks[block].push(row);
                    Slot::Block(block)
                }
            };
            slots.push(slot);
        }

        Self {
            slots,
            blocks,
            open,
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Rows after `row` that `row` must be compared with, ascending.
    pub fn candidates(&self, row: usize) -> Vec<usize> {
        match self.slots[row] {
            Slot::Excluded => Vec::new(),
            Slot::Open => ((row + 1)..self.slots.len())
                .filter(|other| self.slots[*other] != Slot::Excluded)
                .collect(),
            Slot::Block(block) => {
                let mut out = later_than(&self.blocks[block], row);
                out.extend(later_than(&self.open, row));
                out.sort_unstable();
                out
            }
        }
    }
}

fn later_than(sorted: &[usize], row: usize) -> Vec<usize> {
    let start = sorted.partition_point(|idx| *idx <= row);
    sorted[start..].to_vec()
}

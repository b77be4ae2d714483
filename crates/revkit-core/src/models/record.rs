use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result, RevkitError};

/// Column index into a [`RecordTable`] schema, resolved once from a field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(usize);

impl FieldId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// One bibliographic entry: a fixed-width row of optional text values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    values: Vec<Option<String>>,
}

impl Record {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self {
            source: None,
            values,
        }
    }

    /// Builds a record from plain strings; empty strings become absent.
    pub fn from_strs<S: AsRef<str>>(values: &[S]) -> Self {
        Self::new(
            values
                .iter()
                .map(|v| Some(v.as_ref().to_string()).filter(|v| !v.trim().is_empty()))
                .collect(),
        )
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Value of a field. Blank and missing cells both read as `None`.
    pub fn get(&self, field: FieldId) -> Option<&str> {
        self.values
            .get(field.0)
            .and_then(Option::as_deref)
            .filter(|v| !v.trim().is_empty())
    }

    /// Number of non-blank fields.
    pub fn filled_count(&self) -> usize {
        self.values
            .iter()
            .flatten()
            .filter(|v| !v.trim().is_empty())
            .count()
    }
}

/// Ordered set of records sharing one schema.
///
/// Row order is the import order and is never changed by the table itself;
/// "first encountered" tie-breaks downstream rely on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTable {
    fields: Vec<String>,
    records: Vec<Record>,
}

impl RecordTable {
    /// Creates an empty table. Field names are trimmed and lower-cased and
    /// must be unique.
    pub fn new<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = Vec::new();
        for raw in fields {
            let name = canonical_field_name(raw.as_ref());
            if name.is_empty() {
                return Err(RevkitError::Schema("empty field name".to_string()));
            }
            if names.contains(&name) {
                return Err(RevkitError::Schema(format!("duplicate field `{name}`")));
            }
            names.push(name);
        }
        Ok(Self {
            fields: names,
            records: Vec::new(),
        })
    }

    pub fn push(&mut self, record: Record) -> Result<()> {
        if record.width() != self.fields.len() {
            return Err(RevkitError::Schema(format!(
                "record has {} values but schema has {} fields",
                record.width(),
                self.fields.len()
            )));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, row: usize) -> Option<&Record> {
        self.records.get(row)
    }

    /// Records with their original index, in input order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.records.iter().enumerate()
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        let name = canonical_field_name(name);
        self.fields.iter().position(|f| *f == name).map(FieldId)
    }

    pub fn require_field(&self, name: &str) -> std::result::Result<FieldId, ConfigurationError> {
        self.field_id(name)
            .ok_or_else(|| ConfigurationError::UnknownField(name.to_string()))
    }

    pub fn field_name(&self, field: FieldId) -> &str {
        &self.fields[field.0]
    }

    /// Value at (row, field). Out-of-range rows read as absent.
    pub fn value(&self, row: usize, field: FieldId) -> Option<&str> {
        self.records.get(row).and_then(|r| r.get(field))
    }

    /// Value looked up by field name. Unknown names read as absent.
    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        self.field_id(name).and_then(|id| self.value(row, id))
    }

    /// Appends a column (all cells absent). Returns the existing id when the
    /// field is already present.
    pub fn add_field(&mut self, name: &str) -> FieldId {
        if let Some(id) = self.field_id(name) {
            return id;
        }
        self.fields.push(canonical_field_name(name));
        for record in &mut self.records {
            record.values.push(None);
        }
        FieldId(self.fields.len() - 1)
    }

    pub fn set_value(&mut self, row: usize, field: FieldId, value: Option<String>) {
        if let Some(slot) = self
            .records
            .get_mut(row)
            .and_then(|r| r.values.get_mut(field.0))
        {
            *slot = value;
        }
    }

    /// Labels every record with the file or batch it came from.
    pub fn set_source(&mut self, source: &str) {
        for record in &mut self.records {
            record.source = Some(source.to_string());
        }
    }

    /// New table holding clones of `rows`, in the given order.
    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            fields: self.fields.clone(),
            records: rows
                .iter()
                .filter_map(|row| self.records.get(*row).cloned())
                .collect(),
        }
    }

    /// Stacks tables in order, unioning their schemas (first-seen field order).
    pub fn concat(tables: Vec<RecordTable>) -> Self {
        let mut builder = RecordTableBuilder::new();
        for table in tables {
            for name in &table.fields {
                builder.declare_field(name);
            }
            for record in table.records {
                let fields = table
                    .fields
                    .iter()
                    .zip(record.values)
                    .filter_map(|(name, value)| value.map(|v| (name.clone(), v)));
                builder.push_fields(record.source, fields);
            }
        }
        builder.build()
    }
}

/// Collects loosely-shaped records (as produced by importers) into a
/// fixed-width [`RecordTable`].
#[derive(Debug, Default)]
pub struct RecordTableBuilder {
    fields: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<(Option<String>, Vec<(usize, String)>)>,
}

impl RecordTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a field even if no record carries it.
    pub fn declare_field(&mut self, name: &str) -> usize {
        let name = canonical_field_name(name);
        if let Some(idx) = self.index.get(&name) {
            return *idx;
        }
        let idx = self.fields.len();
        self.index.insert(name.clone(), idx);
        self.fields.push(name);
        idx
    }

    /// Adds one record. A field repeated within the record keeps its last value.
    pub fn push_fields<I, K, V>(&mut self, source: Option<String>, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut cells = Vec::new();
        for (name, value) in fields {
            if name.as_ref().trim().is_empty() {
                continue;
            }
            let idx = self.declare_field(name.as_ref());
            cells.push((idx, value.into()));
        }
        self.rows.push((source, cells));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn build(self) -> RecordTable {
        let width = self.fields.len();
        let records = self
            .rows
            .into_iter()
            .map(|(source, cells)| {
                let mut values = vec![None; width];
                for (idx, value) in cells {
                    values[idx] = Some(value).filter(|v| !v.trim().is_empty());
                }
                Record { source, values }
            })
            .collect();
        RecordTable {
            fields: self.fields,
            records,
        }
    }
}

fn canonical_field_name(name: &str) -> String {
    name.trim().to_lowercase()
}

//! Duplicate detection pipeline: normalize, compare, cluster, annotate.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::blocking::{BlockPlan, Blocking};
use crate::cluster::resolve_clusters;
use crate::error::{ConfigurationError, Result};
use crate::models::{FieldId, RecordTable};
use crate::normalize::NormalizerOptions;
use crate::similarity::{
    DEFAULT_THRESHOLD, MatchMethod, Matcher, NormalizedColumn, PairMatch, SimilarityScore,
    validate_threshold,
};

/// Column added by [`extract_unique`] holding each cluster's size.
pub const N_DUPLICATES_FIELD: &str = "n_duplicates";

/// Which member of a cluster survives into the unique set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Representative {
    /// Lowest original index.
    #[default]
    First,
    /// Most non-blank fields; ties go to the lowest index.
    MostComplete,
}

impl FromStr for Representative {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "most-complete" | "most_complete" => Ok(Self::MostComplete),
            _ => Err(ConfigurationError::InvalidRepresentative(s.to_string())),
        }
    }
}

/// Settings for one deduplication run.
///
/// `match_by` is an ordered fallback list: a pair is compared on the first
/// field both records carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    #[serde(deserialize_with = "one_or_many")]
    pub match_by: Vec<String>,
    pub method: MatchMethod,
    pub threshold: f64,
    pub representative: Representative,
    #[serde(flatten)]
    pub normalizer: NormalizerOptions,
    pub blocking: Blocking,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            match_by: vec!["title".to_string()],
            method: MatchMethod::default(),
            threshold: DEFAULT_THRESHOLD,
            representative: Representative::First,
            normalizer: NormalizerOptions::default(),
            blocking: Blocking::None,
        }
    }
}

/// A [`DedupConfig`] checked against one table's schema.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub match_fields: Vec<FieldId>,
    pub group_fields: Vec<FieldId>,
    pub matcher: Matcher,
}

impl DedupConfig {
    pub fn new<I, S>(match_by: I, method: MatchMethod) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            match_by: match_by.into_iter().map(Into::into).collect(),
            method,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerOptions) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_blocking(mut self, blocking: Blocking) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_representative(mut self, representative: Representative) -> Self {
        self.representative = representative;
        self
    }

    /// Resolves field names and checks every option before any work starts.
    pub fn validate(
        &self,
        table: &RecordTable,
    ) -> std::result::Result<ValidatedConfig, ConfigurationError> {
        if self.match_by.is_empty() {
            return Err(ConfigurationError::EmptyMatchBy);
        }
        let match_fields = self
            .match_by
            .iter()
            .map(|name| table.require_field(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        validate_threshold(self.threshold)?;
        let group_fields = self.blocking.validate(table)?;
        let matcher = Matcher::new(self.method, self.threshold)?;

        Ok(ValidatedConfig {
            match_fields,
            group_fields,
            matcher,
        })
    }
}

/// Non-fatal data problem found during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// The record has none of the `match_by` fields and stays a singleton.
    MissingMatchFields { record: usize, fields: Vec<String> },
}

impl DataQualityWarning {
    pub fn record(&self) -> usize {
        match self {
            Self::MissingMatchFields { record, .. } => *record,
        }
    }
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMatchFields { record, fields } => write!(
                f,
                "record {record} has no value for {}; left unmatched",
                fields.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub id: usize,
    /// Record indices, ascending.
    pub members: Vec<usize>,
    pub representative: usize,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// Cluster membership for every input record.
///
/// Clusters partition the input: ids are dense and numbered by each
/// cluster's lowest record index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeduplicationResult {
    pub cluster_of: Vec<usize>,
    pub clusters: Vec<Cluster>,
    /// Pairs that linked records together, sorted by (left, right).
    pub matches: Vec<PairMatch>,
    pub warnings: Vec<DataQualityWarning>,
}

impl DeduplicationResult {
    pub fn record_count(&self) -> usize {
        self.cluster_of.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Records that would be dropped by [`extract_unique`].
    pub fn duplicate_count(&self) -> usize {
        self.record_count() - self.cluster_count()
    }

    pub fn cluster_id(&self, record: usize) -> Option<usize> {
        self.cluster_of.get(record).copied()
    }

    pub fn cluster_of_record(&self, record: usize) -> Option<&Cluster> {
        self.cluster_id(record).map(|id| &self.clusters[id])
    }

    pub fn representatives(&self) -> Vec<usize> {
        self.clusters.iter().map(|c| c.representative).collect()
    }

    pub fn is_representative(&self, record: usize) -> bool {
        self.cluster_of_record(record)
            .is_some_and(|c| c.representative == record)
    }

    /// Clusters with more than one member.
    pub fn duplicate_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(|c| !c.is_singleton())
    }
}

/// Groups duplicate records of `table` according to `config`.
///
/// The input is never modified. Configuration problems are reported before
/// any comparison is made.
pub fn deduplicate(table: &RecordTable, config: &DedupConfig) -> Result<DeduplicationResult> {
    let validated = config.validate(table)?;

    let span = tracing::info_span!(
        "deduplicate",
        records = table.len(),
        method = %config.method,
        threshold = config.threshold,
    );
    let _guard = span.enter();

    let columns: Vec<NormalizedColumn> = validated
        .match_fields
        .iter()
        .map(|field| NormalizedColumn {
            field: *field,
            values: config.normalizer.normalize_column(table, *field),
        })
        .collect();

    let warnings = missing_field_warnings(table, &columns);
    if !warnings.is_empty() {
        warn!(
            count = warnings.len(),
            "records without any match_by value are left unmatched"
        );
        for warning in &warnings {
            debug!("{warning}");
        }
    }

    let mut matches = if uses_exact_buckets(config, &columns) {
        exact_bucket_matches(&columns[0])
    } else {
        let plan = BlockPlan::build(
            &config.blocking,
            table,
            &columns[0],
            &validated.group_fields,
            &config.normalizer,
        );
        debug!(blocks = plan.block_count(), "comparing candidate pairs");
        pairwise_matches(&validated.matcher, &columns, &plan)
    };
    matches.sort_by_key(|m| (m.left, m.right));

    let partition = resolve_clusters(table.len(), matches.iter().map(|m| (m.left, m.right)));

    let mut cluster_of = vec![0; table.len()];
    let clusters: Vec<Cluster> = partition
        .into_iter()
        .enumerate()
        .map(|(id, members)| {
            for member in &members {
                cluster_of[*member] = id;
            }
            let representative = choose_representative(table, &members, config.representative);
            Cluster {
                id,
                members,
                representative,
            }
        })
        .collect();

    info!(
        clusters = clusters.len(),
        matches = matches.len(),
        duplicates = table.len() - clusters.len(),
        "deduplication finished"
    );

    Ok(DeduplicationResult {
        cluster_of,
        clusters,
        matches,
        warnings,
    })
}

/// One record per cluster, in cluster order, plus an `n_duplicates` column.
///
/// With `merge` set, fields the representative lacks are filled from the
/// other members in index order.
pub fn extract_unique(table: &RecordTable, result: &DeduplicationResult, merge: bool) -> RecordTable {
    let mut unique = table.select(&result.representatives());
    let width = table.fields().len();

    if merge {
        for (row, cluster) in result.clusters.iter().enumerate() {
            for field in (0..width).map(FieldId::from_index) {
                if unique.value(row, field).is_some() {
                    continue;
                }
                let filler = cluster
                    .members
                    .iter()
                    .find_map(|member| table.value(*member, field));
                if let Some(value) = filler {
                    unique.set_value(row, field, Some(value.to_string()));
                }
            }
        }
    }

    let count_field = unique.add_field(N_DUPLICATES_FIELD);
    for (row, cluster) in result.clusters.iter().enumerate() {
        unique.set_value(row, count_field, Some(cluster.len().to_string()));
    }

    unique
}

fn missing_field_warnings(
    table: &RecordTable,
    columns: &[NormalizedColumn],
) -> Vec<DataQualityWarning> {
    (0..table.len())
        .filter(|row| columns.iter().all(|column| column.get(*row).is_none()))
        .map(|record| DataQualityWarning::MissingMatchFields {
            record,
            fields: columns
                .iter()
                .map(|column| table.field_name(column.field).to_string())
                .collect(),
        })
        .collect()
}

/// Exact matching on a single field needs no pairwise scan: equal values
/// share a bucket, and prefix blocking can never split equal values.
fn uses_exact_buckets(config: &DedupConfig, columns: &[NormalizedColumn]) -> bool {
    config.method == MatchMethod::Exact
        && columns.len() == 1
        && !matches!(config.blocking, Blocking::Fields { .. })
}

fn exact_bucket_matches(column: &NormalizedColumn) -> Vec<PairMatch> {
    let mut buckets: HashMap<&str, usize> = HashMap::new();
    let mut matches = Vec::new();

    for (row, value) in column.values.iter().enumerate() {
        let Some(value) = value.as_deref() else {
            continue;
        };
        match buckets.get(value) {
            Some(first) => matches.push(PairMatch {
                left: *first,
                right: row,
                field: column.field,
                score: SimilarityScore {
                    ratio: 1.0,
                    distance: None,
                },
            }),
            None => {
                buckets.insert(value, row);
            }
        }
    }

    matches
}

fn row_matches(
    matcher: &Matcher,
    columns: &[NormalizedColumn],
    plan: &BlockPlan,
    row: usize,
) -> Vec<PairMatch> {
    plan.candidates(row)
        .into_iter()
        .filter_map(|other| matcher.compare_records(columns, row, other))
        .collect()
}

#[cfg(feature = "parallel")]
fn pairwise_matches(
    matcher: &Matcher,
    columns: &[NormalizedColumn],
    plan: &BlockPlan,
) -> Vec<PairMatch> {
    use rayon::prelude::*;

    let rows = columns.first().map_or(0, |c| c.values.len());
    (0..rows)
        .into_par_iter()
        .flat_map_iter(|row| row_matches(matcher, columns, plan, row))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn pairwise_matches(
    matcher: &Matcher,
    columns: &[NormalizedColumn],
    plan: &BlockPlan,
) -> Vec<PairMatch> {
    let rows = columns.first().map_or(0, |c| c.values.len());
    (0..rows)
        .flat_map(|row| row_matches(matcher, columns, plan, row))
        .collect()
}

fn choose_representative(table: &RecordTable, members: &[usize], policy: Representative) -> usize {
    let mut best = members[0];
    if policy == Representative::First {
        return best;
    }

    let mut best_score = completeness(table, best);
    for idx in members.iter().copied().skip(1) {
        let score = completeness(table, idx);
        if score > best_score {
            best_score = score;
            best = idx;
        }
    }
    best
}

fn completeness(table: &RecordTable, row: usize) -> usize {
    table.record(row).map_or(0, |r| r.filled_count())
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(field) => vec![field],
        OneOrMany::Many(fields) => fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RevkitError;
    use crate::models::Record;
    use crate::similarity::FuzzyAlgorithm;

    fn titles(values: &[&str]) -> RecordTable {
        let mut table = RecordTable::new(["title"]).unwrap();
        for value in values {
            table.push(Record::from_strs(&[*value])).unwrap();
        }
        table
    }

    fn exact_on_title() -> DedupConfig {
        DedupConfig::new(["title"], MatchMethod::Exact)
    }

    fn osa_on_title(threshold: f64) -> DedupConfig {
        DedupConfig::new(["title"], MatchMethod::Fuzzy(FuzzyAlgorithm::Osa))
            .with_threshold(threshold)
    }

    #[test]
    fn unknown_match_field_fails_before_comparing() {
        let table = titles(&["a", "b"]);
        let config = DedupConfig::new(["doi"], MatchMethod::Exact);
        let err = deduplicate(&table, &config).unwrap_err();
        assert!(matches!(
            err,
            RevkitError::Configuration(ConfigurationError::UnknownField(ref f)) if f == "doi"
        ));
    }

    #[test]
    fn threshold_out_of_range_is_rejected_even_for_exact() {
        let table = titles(&["a"]);
        let config = exact_on_title().with_threshold(1.2);
        assert!(matches!(
            deduplicate(&table, &config),
            Err(RevkitError::Configuration(
                ConfigurationError::ThresholdOutOfRange(_)
            ))
        ));
    }

    #[test]
    fn empty_match_by_is_rejected() {
        let table = titles(&["a"]);
        let config = DedupConfig::new(Vec::<String>::new(), MatchMethod::Exact);
        assert!(matches!(
            deduplicate(&table, &config),
            Err(RevkitError::Configuration(ConfigurationError::EmptyMatchBy))
        ));
    }

    #[test]
    fn to_lower_decides_woodpecker_case() {
        let table = titles(&["Woodpecker", "WOODPECKER"]);

        let folded = exact_on_title().with_normalizer(NormalizerOptions {
            to_lower: true,
            ..NormalizerOptions::default()
        });
        let result = deduplicate(&table, &folded).unwrap();
        assert_eq!(result.cluster_count(), 1);
        assert_eq!(result.cluster_of, vec![0, 0]);

        let result = deduplicate(&table, &exact_on_title()).unwrap();
        assert_eq!(result.cluster_count(), 2);
    }

    #[test]
    fn exact_method_clusters_identical_and_separates_different() {
        let table = titles(&["Fire", "Grazing", "Fire", "Fire ", "fire"]);
        let result = deduplicate(&table, &exact_on_title()).unwrap();

        // trailing space is collapsed by the default whitespace trim
        assert_eq!(result.clusters[0].members, vec![0, 2, 3]);
        assert_eq!(result.cluster_of, vec![0, 1, 0, 0, 2]);
        assert_eq!(result.duplicate_count(), 2);
    }

    #[test]
    fn fuzzy_boundary_on_titles() {
        let table = titles(&["Prescribed Burning", "Prescribed Burnin"]);
        let result = deduplicate(&table, &osa_on_title(0.9)).unwrap();
        assert_eq!(result.cluster_count(), 1);
        assert_eq!(result.matches[0].score.distance, Some(1));

        let result = deduplicate(&table, &osa_on_title(17.0 / 18.0)).unwrap();
        assert_eq!(result.cluster_count(), 1);

        let table = titles(&["Prescribed Burning", "Prescribed Burn"]);
        let result = deduplicate(&table, &osa_on_title(0.9)).unwrap();
        assert_eq!(result.cluster_count(), 2);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn fuzzy_matches_chain_transitively() {
        let table = titles(&["abcdefghij", "abcdefghiX", "abcdefghYX", "zzz"]);
        let result = deduplicate(&table, &osa_on_title(0.9)).unwrap();
        // 0~1 and 1~2 match, 0~2 does not: still one cluster
        assert_eq!(result.cluster_of, vec![0, 0, 0, 1]);
        assert_eq!(result.matches.len(), 2);
    }

    #[test]
    fn missing_field_becomes_singleton_with_warning() {
        let table = titles(&["Fire", "", "Fire"]);
        let result = deduplicate(&table, &exact_on_title()).unwrap();

        assert_eq!(result.cluster_of, vec![0, 1, 0]);
        assert_eq!(
            result.warnings,
            vec![DataQualityWarning::MissingMatchFields {
                record: 1,
                fields: vec!["title".to_string()],
            }]
        );
    }

    #[test]
    fn empty_values_do_not_match_each_other() {
        let table = titles(&["", "", "?!"]);
        let config = exact_on_title().with_normalizer(NormalizerOptions {
            rm_punctuation: true,
            ..NormalizerOptions::default()
        });
        let result = deduplicate(&table, &config).unwrap();
        assert_eq!(result.cluster_count(), 3);
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn match_by_falls_back_to_later_fields() {
        let mut table = RecordTable::new(["doi", "title"]).unwrap();
        table
            .push(Record::from_strs(&["10.1/fire", "Fire regimes"]))
            .unwrap();
        table.push(Record::from_strs(&["", "Fire regimes"])).unwrap();
        table
            .push(Record::from_strs(&["10.1/other", "Fire regimes"]))
            .unwrap();

        let config = DedupConfig::new(["doi", "title"], MatchMethod::Exact);
        let result = deduplicate(&table, &config).unwrap();

        // 0 and 2 disagree on doi, so their shared title is never consulted;
        // 1 has no doi and links to both through the title.
        assert_eq!(result.cluster_of, vec![0, 0, 0]);
        let linked: Vec<_> = result.matches.iter().map(|m| (m.left, m.right)).collect();
        assert_eq!(linked, vec![(0, 1), (1, 2)]);
        let title = table.field_id("title").unwrap();
        assert!(result.matches.iter().all(|m| m.field == title));
    }

    #[test]
    fn representative_is_lowest_index_by_default() {
        let table = titles(&["Fire", "Grazing", "Fire"]);
        let result = deduplicate(&table, &exact_on_title()).unwrap();
        assert_eq!(result.representatives(), vec![0, 1]);
        assert!(result.is_representative(0));
        assert!(!result.is_representative(2));
    }

    #[test]
    fn most_complete_representative_breaks_ties_by_index() {
        let mut table = RecordTable::new(["title", "doi", "year"]).unwrap();
        table.push(Record::from_strs(&["Fire", "", ""])).unwrap();
        table.push(Record::from_strs(&["Fire", "10.1/x", ""])).unwrap();
        table.push(Record::from_strs(&["Fire", "", "2001"])).unwrap();

        let config = exact_on_title().with_representative(Representative::MostComplete);
        let result = deduplicate(&table, &config).unwrap();
        assert_eq!(result.representatives(), vec![1]);
    }

    #[test]
    fn field_blocking_limits_comparisons() {
        let mut table = RecordTable::new(["title", "year"]).unwrap();
        table.push(Record::from_strs(&["Fire", "2001"])).unwrap();
        table.push(Record::from_strs(&["Fire", "2002"])).unwrap();
        table.push(Record::from_strs(&["Fire", "2001"])).unwrap();

        let config = exact_on_title().with_blocking(Blocking::Fields {
            fields: vec!["year".to_string()],
        });
        let result = deduplicate(&table, &config).unwrap();
        assert_eq!(result.cluster_of, vec![0, 1, 0]);
    }

    #[test]
    fn prefix_blocking_keeps_fuzzy_matches_with_shared_prefix() {
        let table = titles(&["Prescribed Burning", "Grazing", "Prescribed Burnin"]);
        let config = osa_on_title(0.9).with_blocking(Blocking::Prefix { length: 5 });
        let result = deduplicate(&table, &config).unwrap();
        assert_eq!(result.cluster_of, vec![0, 1, 0]);
    }

    #[test]
    fn input_table_is_untouched() {
        let table = titles(&["Fire!", "fire"]);
        let before = table.clone();
        let config = exact_on_title().with_normalizer(NormalizerOptions {
            to_lower: true,
            rm_punctuation: true,
            ..NormalizerOptions::default()
        });
        let result = deduplicate(&table, &config).unwrap();
        assert_eq!(result.cluster_count(), 1);
        assert_eq!(table, before);
    }

    #[test]
    fn extract_unique_counts_and_merges() {
        let mut table = RecordTable::new(["title", "doi", "year"]).unwrap();
        table.push(Record::from_strs(&["Fire", "", ""])).unwrap();
        table.push(Record::from_strs(&["Grazing", "", "1999"])).unwrap();
        table.push(Record::from_strs(&["Fire", "10.1/x", "2001"])).unwrap();

        let result = deduplicate(&table, &exact_on_title()).unwrap();

        let plain = extract_unique(&table, &result, false);
        assert_eq!(plain.len(), 2);
        assert_eq!(plain.get(0, "doi"), None);
        assert_eq!(plain.get(0, N_DUPLICATES_FIELD), Some("2"));
        assert_eq!(plain.get(1, N_DUPLICATES_FIELD), Some("1"));

        let merged = extract_unique(&table, &result, true);
        assert_eq!(merged.get(0, "title"), Some("Fire"));
        assert_eq!(merged.get(0, "doi"), Some("10.1/x"));
        assert_eq!(merged.get(0, "year"), Some("2001"));
        assert_eq!(table.get(0, "doi"), None);
    }

    #[test]
    fn deduplicating_unique_output_is_identity() {
        let table = titles(&["Fire", "Grazing", "Fire", "Logging"]);
        let first = deduplicate(&table, &exact_on_title()).unwrap();
        let unique = extract_unique(&table, &first, false);

        let second = deduplicate(&unique, &exact_on_title()).unwrap();
        assert_eq!(second.cluster_of, vec![0, 1, 2]);
        assert!(second.matches.is_empty());
    }

    #[test]
    fn empty_table_yields_empty_result() {
        let table = titles(&[]);
        let result = deduplicate(&table, &osa_on_title(0.9)).unwrap();
        assert_eq!(result.record_count(), 0);
        assert_eq!(result.cluster_count(), 0);
    }

    #[test]
    fn config_deserializes_single_field_or_list() {
        let single: DedupConfig = toml::from_str(
            r#"
            match_by = "doi"
            method = "exact"
            to_lower = true
            "#,
        )
        .unwrap();
        assert_eq!(single.match_by, vec!["doi"]);
        assert_eq!(single.method, MatchMethod::Exact);
        assert!(single.normalizer.to_lower);
        assert!(single.normalizer.trim_whitespace);

        let list: DedupConfig = toml::from_str(
            r#"
            match_by = ["doi", "title"]
            method = "fuzzy:levenshtein"
            threshold = 0.85
            representative = "most-complete"

            [blocking]
            strategy = "prefix"
            length = 4
            "#,
        )
        .unwrap();
        assert_eq!(list.match_by, vec!["doi", "title"]);
        assert_eq!(list.threshold, 0.85);
        assert_eq!(list.blocking, Blocking::Prefix { length: 4 });
        assert_eq!(list.representative, Representative::MostComplete);

        let bad = toml::from_str::<DedupConfig>(r#"method = "fuzzy:soundex""#);
        assert!(bad.is_err());
    }
}

use std::collections::BTreeSet;

use proptest::prelude::*;
use revkit_core::{
    Blocking, DedupConfig, FuzzyAlgorithm, MatchMethod, NormalizerOptions, Record, RecordTable,
    deduplicate,
};

fn table_of(titles: &[Option<String>]) -> RecordTable {
    let mut table = RecordTable::new(["title"]).unwrap();
    for title in titles {
        table.push(Record::new(vec![title.clone()])).unwrap();
    }
    table
}

fn titles() -> impl Strategy<Value = Vec<Option<String>>> {
    // A small alphabet keeps collisions and near-duplicates frequent.
    prop::collection::vec(prop::option::weighted(0.85, "[abAB ,]{0,8}"), 0..24)
}

fn configs() -> impl Strategy<Value = DedupConfig> {
    let method = prop_oneof![
        Just(MatchMethod::Exact),
        Just(MatchMethod::Fuzzy(FuzzyAlgorithm::Osa)),
        Just(MatchMethod::Fuzzy(FuzzyAlgorithm::Levenshtein)),
        Just(MatchMethod::Fuzzy(FuzzyAlgorithm::JaroWinkler)),
        Just(MatchMethod::Fuzzy(FuzzyAlgorithm::TokenSort)),
    ];
    let blocking = prop_oneof![
        Just(Blocking::None),
        (1usize..4).prop_map(|length| Blocking::Prefix { length }),
    ];
    (method, 0.0f64..=1.0, any::<bool>(), any::<bool>(), blocking).prop_map(
        |(method, threshold, to_lower, rm_punctuation, blocking)| {
            DedupConfig::new(["title"], method)
                .with_threshold(threshold)
                .with_normalizer(NormalizerOptions {
                    to_lower,
                    rm_punctuation,
                    ..NormalizerOptions::default()
                })
                .with_blocking(blocking)
        },
    )
}

fn partition_sets(clusters: &[Vec<usize>]) -> BTreeSet<BTreeSet<usize>> {
    clusters
        .iter()
        .map(|members| members.iter().copied().collect())
        .collect()
}

proptest! {
    #[test]
    fn clusters_partition_every_record(titles in titles(), config in configs()) {
        let table = table_of(&titles);
        let result = deduplicate(&table, &config).unwrap();

        let mut seen = vec![0usize; table.len()];
        for cluster in &result.clusters {
            prop_assert!(!cluster.members.is_empty());
            prop_assert_eq!(cluster.representative, cluster.members[0]);
            for member in &cluster.members {
                seen[*member] += 1;
                prop_assert_eq!(result.cluster_of[*member], cluster.id);
            }
        }
        prop_assert!(seen.iter().all(|count| *count == 1));
        prop_assert_eq!(result.cluster_of.len(), table.len());
    }

    #[test]
    fn repeated_runs_agree(titles in titles(), config in configs()) {
        let table = table_of(&titles);
        let first = deduplicate(&table, &config).unwrap();
        let second = deduplicate(&table, &config).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn partition_does_not_depend_on_input_order(titles in titles(), config in configs()) {
        // greedy Jaro matching is not guaranteed symmetric
        prop_assume!(config.method != MatchMethod::Fuzzy(FuzzyAlgorithm::JaroWinkler));
        let table = table_of(&titles);
        let reversed: Vec<Option<String>> = titles.iter().rev().cloned().collect();
        let reversed_table = table_of(&reversed);

        let forward = deduplicate(&table, &config).unwrap();
        let backward = deduplicate(&reversed_table, &config).unwrap();

        let n = titles.len();
        let mapped: Vec<Vec<usize>> = backward
            .clusters
            .iter()
            .map(|c| c.members.iter().map(|idx| n - 1 - idx).collect())
            .collect();
        let forward_members: Vec<Vec<usize>> =
            forward.clusters.iter().map(|c| c.members.clone()).collect();
        prop_assert_eq!(partition_sets(&forward_members), partition_sets(&mapped));
    }

    #[test]
    fn exact_clusters_are_exactly_equal_values(titles in titles()) {
        let table = table_of(&titles);
        let config = DedupConfig::new(["title"], MatchMethod::Exact)
            .with_normalizer(NormalizerOptions::identity());
        let result = deduplicate(&table, &config).unwrap();

        for i in 0..titles.len() {
            for j in (i + 1)..titles.len() {
                let same_value = matches!(
                    (&titles[i], &titles[j]),
                    (Some(a), Some(b)) if a == b && !a.trim().is_empty()
                );
                prop_assert_eq!(result.cluster_of[i] == result.cluster_of[j], same_value);
            }
        }
    }

    #[test]
    fn distinct_values_stay_apart(raw in prop::collection::btree_set("[a-z]{1,6}", 0..16)) {
        let titles: Vec<Option<String>> = raw.into_iter().map(Some).collect();
        let table = table_of(&titles);
        let config = DedupConfig::new(["title"], MatchMethod::Exact);
        let result = deduplicate(&table, &config).unwrap();
        prop_assert_eq!(result.cluster_count(), titles.len());
        prop_assert!(result.matches.is_empty());
    }
}

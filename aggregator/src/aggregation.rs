use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use rustc_hash::FxHasher;

use crate::{
    labels::{GroupKey, LabelNames, Labels},
    value::Observation,
};

// See https://docs.rs/indexmap/latest/indexmap/#alternate-hashers
type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Aggregation groups of one metric family, ordered by key.
pub type AggregatedGroups = FxIndexMap<GroupKey, AggregatedGroup>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedGroup {
    /// Labels that survived aggregation.
    pub labels: Labels,
    pub value: f64,
    /// Number of observations summed into `value`.
    pub num: usize,
}

/// Sums `observations` over every label in `drop_labels`, the way
/// `sum without (drop_labels) (...)` does.
///
/// Each observation lands in exactly one group. Values are added in input
/// order, so reordering the input may change the result in the last bits of
/// precision, never in grouping.
pub fn aggregate(observations: &[Observation], drop_labels: &LabelNames) -> AggregatedGroups {
    let mut groups = AggregatedGroups::default();
    for obs in observations {
        let key = obs.labels.group_key_without(drop_labels);
        let entry = groups.entry(key).or_insert_with_key(|key| AggregatedGroup {
            labels: key.labels().clone(),
            value: 0.0,
            num: 0,
        });
        entry.value += obs.value;
        entry.num += 1;
    }
    groups.sort_keys();
    groups
}

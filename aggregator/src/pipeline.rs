use rustc_hash::FxHashSet;

use crate::{
    aggregation::aggregate,
    labels::{LabelNames, Labels},
    value::{EmittedSeries, MetricFamily},
};

/// Relabeling applied to every family of a collection.
#[derive(Debug, Clone, Default)]
pub struct RelabelConfig {
    /// Family names to keep. Empty keeps every family.
    pub include_metrics: FxHashSet<String>,
    /// Labels aggregated away.
    pub drop_labels: LabelNames,
    /// Prepended to every family name.
    pub prefix: String,
    /// Set on every emitted series, replacing labels of the same name.
    pub extra_labels: Labels,
}

impl RelabelConfig {
    pub fn includes(&self, name: &str) -> bool {
        self.include_metrics.is_empty() || self.include_metrics.contains(name)
    }

    /// Filters, renames, aggregates and labels one family.
    ///
    /// Histogram and summary families are dropped whole: their sub-series
    /// have no meaningful sum.
    pub fn process(&self, family: &MetricFamily) -> Vec<EmittedSeries> {
        if !self.includes(&family.name) {
            return Vec::new();
        }
        if !family.kind.is_scalar() {
            tracing::debug!(
                metric = %family.name,
                kind = %family.kind,
                "skipping family without scalar values"
            );
            return Vec::new();
        }

        let name = format!("{}{}", self.prefix, family.name);
        aggregate(&family.observations, &self.drop_labels)
            .into_values()
            .filter_map(|group| {
                tracing::trace!(
                    metric = %name,
                    labels = %group.labels,
                    observations = group.num,
                    "aggregated group"
                );
                let mut labels = group.labels;
                for label in self.extra_labels.iter() {
                    labels.insert(&label.name, &label.value);
                }
                EmittedSeries::new(
                    name.clone(),
                    family.help.clone(),
                    family.kind,
                    labels,
                    group.value,
                )
                .map_err(|error| {
                    tracing::error!(%error, metric = %name, "error creating series");
                })
                .ok()
            })
            .collect()
    }
}

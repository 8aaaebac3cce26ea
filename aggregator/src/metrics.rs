//! Metrics about the aggregator itself.

use prometheus::{proto::MetricFamily, HistogramOpts, HistogramTimer, HistogramVec, Registry};

pub const COLLECTION_DURATION: &str = "metrics_aggregation_duration_seconds";

/// Whether samples named `name` would land in one of our own families.
pub fn is_reserved_name(name: &str) -> bool {
    name.strip_prefix(COLLECTION_DURATION)
        .map_or(false, |suffix| matches!(suffix, "" | "_bucket" | "_sum" | "_count"))
}

/// Process-wide self metrics, shared by every in-flight collection.
///
/// Cloning is cheap and clones observe into the same histogram.
#[derive(Clone)]
pub struct SelfMetrics {
    registry: Registry,
    collection_duration: HistogramVec,
}

impl SelfMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let collection_duration = HistogramVec::new(
            HistogramOpts::new(COLLECTION_DURATION, "Duration of a collection"),
            &["remote"],
        )?;
        registry.register(Box::new(collection_duration.clone()))?;
        Ok(Self {
            registry,
            collection_duration,
        })
    }

    /// Starts timing one collection from `remote`. The duration is observed
    /// when the returned timer is dropped.
    pub fn start_collection(&self, remote: &str) -> HistogramTimer {
        self.collection_duration
            .with_label_values(&[remote])
            .start_timer()
    }

    /// Number of collections observed for `remote`.
    pub fn collection_count(&self, remote: &str) -> u64 {
        self.collection_duration
            .with_label_values(&[remote])
            .get_sample_count()
    }

    /// Snapshot of every self metric.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

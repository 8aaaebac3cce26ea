pub mod aggregation;
pub mod collector;
mod error;
pub mod exposition;
mod labels;
pub mod metrics;
pub mod pipeline;
pub mod value;

pub use {
    aggregation::aggregate,
    collector::{Fetch, HttpFetcher, RemoteAggregator},
    error::{DecodeError, DecodeErrorKind, FetchError, SeriesError},
    labels::{GroupKey, Label, LabelNames, Labels},
    metrics::SelfMetrics,
    pipeline::RelabelConfig,
};

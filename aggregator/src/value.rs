use once_cell::sync::Lazy;
use regex::Regex;
use strum::{Display, EnumString};

use crate::{labels::Labels, SeriesError};

static METRIC_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").unwrap());
static LABEL_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap());

/// Prefix of label names reserved for internal use.
pub const RESERVED_LABEL_PREFIX: &str = "__";

/// Reference: https://prometheus.io/docs/instrumenting/exposition_formats/#comments-help-text-and-type-information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Untyped,
    Histogram,
    Summary,
}

impl MetricKind {
    /// Whether every series of this kind carries one plain number that can
    /// be summed across series.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            MetricKind::Counter | MetricKind::Gauge | MetricKind::Untyped
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub labels: Labels,
    pub value: f64,
    /// Milliseconds since epoch, as found upstream. Never re-emitted: an
    /// aggregated series has no single source time.
    pub timestamp: Option<i64>,
}

impl Observation {
    pub fn new(labels: Labels, value: f64) -> Self {
        Self {
            labels,
            value,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub observations: Vec<Observation>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            help: String::new(),
            kind,
            observations: Vec::new(),
        }
    }
}

/// A single relabeled series, ready to be encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedSeries {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub labels: Labels,
    pub value: f64,
}

impl EmittedSeries {
    /// Builds a series, rejecting names the exposition format cannot carry.
    pub fn new(
        name: String,
        help: String,
        kind: MetricKind,
        labels: Labels,
        value: f64,
    ) -> Result<Self, SeriesError> {
        if !is_valid_metric_name(&name) {
            return Err(SeriesError::InvalidMetricName(name));
        }
        if let Some(label) = labels.iter().find(|label| {
            !is_valid_label_name(&label.name) || label.name.starts_with(RESERVED_LABEL_PREFIX)
        }) {
            return Err(SeriesError::InvalidLabelName(label.name.clone()));
        }
        Ok(Self {
            name,
            help,
            kind,
            labels,
            value,
        })
    }
}

pub fn is_valid_metric_name(name: &str) -> bool {
    METRIC_NAME_RE.is_match(name)
}

pub fn is_valid_label_name(name: &str) -> bool {
    LABEL_NAME_RE.is_match(name)
}

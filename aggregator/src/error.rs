use reqwest::StatusCode;
use thiserror::Error;

/// Failure to obtain a snapshot from the upstream target.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid target url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status code {0}")]
    Status(StatusCode),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {kind}")]
pub struct DecodeError {
    /// 1-based line of the snapshot where decoding stopped.
    pub line: usize,
    pub kind: DecodeErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeErrorKind {
    #[error("invalid metric name {0:?}")]
    InvalidMetricName(String),
    #[error("invalid label name {0:?}")]
    InvalidLabelName(String),
    #[error("duplicate label name {0:?}")]
    DuplicateLabel(String),
    #[error("unterminated label set")]
    UnterminatedLabels,
    #[error("unterminated label value")]
    UnterminatedLabelValue,
    #[error("invalid escape sequence \\{0}")]
    InvalidEscape(char),
    #[error("invalid sample value {0:?}")]
    InvalidValue(String),
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("unknown metric type {0:?}")]
    UnknownType(String),
    #[error("second HELP line for metric name {0:?}")]
    DuplicateHelp(String),
    #[error("second TYPE line for metric name {0:?}")]
    DuplicateType(String),
    #[error("TYPE line for metric name {0:?} after its samples")]
    TypeAfterSamples(String),
    #[error("metric family {0:?} appears more than once")]
    FamilyReopened(String),
    #[error("unexpected input {0:?}")]
    UnexpectedInput(String),
}

/// A relabeled series that cannot be represented in the exposition format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("invalid metric name {0:?}")]
    InvalidMetricName(String),
    #[error("invalid label name {0:?}")]
    InvalidLabelName(String),
}

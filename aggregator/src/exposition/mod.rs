//! Plain text exposition format, version 0.0.4.
//!
//! See https://prometheus.io/docs/instrumenting/exposition_formats/#text-based-format

mod decode;
mod encode;

pub use decode::Decoder;
pub use encode::{encode, to_families, CONTENT_TYPE};

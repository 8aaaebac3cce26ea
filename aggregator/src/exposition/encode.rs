use prometheus::{proto, TextEncoder};

use crate::value::{EmittedSeries, MetricKind};

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Builds one family per run of consecutive series sharing a name, so callers
/// keep the series of a family together.
///
/// Kinds other than counter and gauge become untyped families. Samples carry
/// no timestamp.
pub fn to_families(series: &[EmittedSeries]) -> Vec<proto::MetricFamily> {
    let mut families: Vec<proto::MetricFamily> = Vec::new();
    for s in series {
        match families.last_mut() {
            Some(family) if family.get_name() == s.name => family.mut_metric().push(metric(s)),
            _ => {
                let mut family = proto::MetricFamily::new();
                family.set_name(s.name.clone());
                family.set_help(s.help.clone());
                family.set_field_type(metric_type(s.kind));
                family.mut_metric().push(metric(s));
                families.push(family);
            }
        }
    }
    families
}

fn metric_type(kind: MetricKind) -> proto::MetricType {
    match kind {
        MetricKind::Counter => proto::MetricType::COUNTER,
        MetricKind::Gauge => proto::MetricType::GAUGE,
        _ => proto::MetricType::UNTYPED,
    }
}

fn metric(series: &EmittedSeries) -> proto::Metric {
    let mut metric = proto::Metric::new();
    for label in series.labels.iter() {
        let mut pair = proto::LabelPair::new();
        pair.set_name(label.name.clone());
        pair.set_value(label.value.clone());
        metric.mut_label().push(pair);
    }
    match metric_type(series.kind) {
        proto::MetricType::COUNTER => {
            let mut counter = proto::Counter::new();
            counter.set_value(series.value);
            metric.set_counter(counter);
        }
        proto::MetricType::GAUGE => {
            let mut gauge = proto::Gauge::new();
            gauge.set_value(series.value);
            metric.set_gauge(gauge);
        }
        _ => {
            let mut untyped = proto::Untyped::new();
            untyped.set_value(series.value);
            metric.set_untyped(untyped);
        }
    }
    metric
}

/// Renders `families` in text exposition format.
///
/// A family the encoder rejects is logged and left out of the output.
pub fn encode(families: &[proto::MetricFamily]) -> String {
    let encoder = TextEncoder::new();
    let mut out = String::new();
    for family in families {
        let encoded = if family.get_field_type() == proto::MetricType::UNTYPED {
            encode_untyped(&encoder, family, &mut out)
        } else {
            encoder.encode_utf8(std::slice::from_ref(family), &mut out)
        };
        if let Err(error) = encoded {
            tracing::error!(%error, metric = family.get_name(), "error encoding metric family");
        }
    }
    out
}

/// `TextEncoder` cannot write untyped families: the samples go out as a gauge
/// and the `# TYPE` line is rewritten.
fn encode_untyped(
    encoder: &TextEncoder,
    family: &proto::MetricFamily,
    out: &mut String,
) -> prometheus::Result<()> {
    let mut gauges = family.clone();
    gauges.set_field_type(proto::MetricType::GAUGE);
    for metric in gauges.mut_metric().iter_mut() {
        let mut gauge = proto::Gauge::new();
        gauge.set_value(metric.get_untyped().get_value());
        metric.set_gauge(gauge);
    }
    let text = encoder.encode_to_string(std::slice::from_ref(&gauges))?;
    let name = family.get_name();
    out.push_str(&text.replacen(
        &format!("# TYPE {name} gauge\n"),
        &format!("# TYPE {name} untyped\n"),
        1,
    ));
    Ok(())
}

use std::{
    iter::Enumerate,
    str::{FromStr, Lines},
};

use rustc_hash::FxHashSet;

use crate::{
    labels::Labels,
    value::{is_valid_label_name, is_valid_metric_name, MetricFamily, MetricKind, Observation},
    DecodeError, DecodeErrorKind,
};

type Result<T> = std::result::Result<T, DecodeErrorKind>;

/// Streaming decoder of a text exposition snapshot.
///
/// Yields one [`MetricFamily`] each time the input moves on to the next
/// family. The first malformed line yields a [`DecodeError`] and ends the
/// stream. Only the family that line belongs to is discarded; every family
/// finished before it is still yielded.
///
/// Sub-series of histograms and summaries (`_bucket`, `_sum`, `_count`) are
/// kept as observations of their family with their labels as written.
pub struct Decoder<'a> {
    lines: Enumerate<Lines<'a>>,
    current: Option<PendingFamily>,
    ready: Option<MetricFamily>,
    error: Option<DecodeError>,
    /// Names of the families that are finished.
    closed: FxHashSet<String>,
    done: bool,
}

struct PendingFamily {
    family: MetricFamily,
    has_help: bool,
    has_type: bool,
}

impl PendingFamily {
    fn new(name: &str) -> Self {
        Self {
            family: MetricFamily::new(name, MetricKind::Untyped),
            has_help: false,
            has_type: false,
        }
    }
}

impl<'a> Decoder<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
            current: None,
            ready: None,
            error: None,
            closed: FxHashSet::default(),
            done: false,
        }
    }

    fn decode_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        match line.strip_prefix('#') {
            Some(comment) => self.decode_comment(comment),
            None => self.decode_sample(line),
        }
    }

    fn decode_comment(&mut self, comment: &str) -> Result<()> {
        let (keyword, rest) = split_token(comment);
        if keyword != "HELP" && keyword != "TYPE" {
            return Ok(());
        }
        let (name, text) = split_token(rest);
        if !is_valid_metric_name(name) {
            return Err(DecodeErrorKind::InvalidMetricName(name.to_owned()));
        }
        let pending = self.open(name)?;
        if keyword == "HELP" {
            if pending.has_help {
                return Err(DecodeErrorKind::DuplicateHelp(name.to_owned()));
            }
            pending.family.help = unescape_help(text)?;
            pending.has_help = true;
        } else {
            if pending.has_type {
                return Err(DecodeErrorKind::DuplicateType(name.to_owned()));
            }
            if !pending.family.observations.is_empty() {
                return Err(DecodeErrorKind::TypeAfterSamples(name.to_owned()));
            }
            let text = text.trim();
            pending.family.kind = MetricKind::from_str(text)
                .map_err(|_| DecodeErrorKind::UnknownType(text.to_owned()))?;
            pending.has_type = true;
        }
        Ok(())
    }

    fn decode_sample(&mut self, line: &str) -> Result<()> {
        let name_end = line
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == ':'))
            .unwrap_or(line.len());
        let (name, rest) = line.split_at(name_end);
        if !is_valid_metric_name(name) {
            let (token, _) = split_token(line);
            return Err(DecodeErrorKind::InvalidMetricName(token.to_owned()));
        }
        let family_name = self.family_name_for(name);
        let pending = self.open(&family_name)?;

        let (labels, rest) = match rest.strip_prefix('{') {
            Some(rest) => parse_labels(rest)?,
            None if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                (Labels::default(), rest)
            }
            None => return Err(DecodeErrorKind::UnexpectedInput(rest.to_owned())),
        };

        let mut tokens = rest.split_whitespace();
        let value = parse_value(tokens.next().unwrap_or_default())?;
        let timestamp = tokens
            .next()
            .map(|t| {
                t.parse::<i64>()
                    .map_err(|_| DecodeErrorKind::InvalidTimestamp(t.to_owned()))
            })
            .transpose()?;
        if let Some(extra) = tokens.next() {
            return Err(DecodeErrorKind::UnexpectedInput(extra.to_owned()));
        }

        pending.family.observations.push(Observation {
            labels,
            value,
            timestamp,
        });
        Ok(())
    }

    /// Resolves a sample name to the family it belongs to, folding the
    /// sub-series of an open histogram or summary into it.
    fn family_name_for(&self, name: &str) -> String {
        if let Some(pending) = &self.current {
            let base = pending.family.name.as_str();
            let suffixes: &[&str] = match pending.family.kind {
                MetricKind::Histogram => &["_bucket", "_sum", "_count"],
                MetricKind::Summary => &["_sum", "_count"],
                _ => &[],
            };
            if suffixes.iter().any(|s| name.strip_suffix(s) == Some(base)) {
                return base.to_owned();
            }
        }
        name.to_owned()
    }

    /// Name of the family `line` refers to, as far as it can be read.
    fn family_of_line(&self, line: &str) -> String {
        let line = line.trim();
        match line.strip_prefix('#') {
            Some(comment) => split_token(split_token(comment).1).0.to_owned(),
            None => {
                let name_end = line
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == ':'))
                    .unwrap_or(line.len());
                self.family_name_for(&line[..name_end])
            }
        }
    }

    /// Makes `name` the family in progress, finishing the previous one.
    fn open(&mut self, name: &str) -> Result<&mut PendingFamily> {
        let is_open = self
            .current
            .as_ref()
            .map_or(false, |pending| pending.family.name == name);
        if !is_open {
            if self.closed.contains(name) {
                return Err(DecodeErrorKind::FamilyReopened(name.to_owned()));
            }
            if let Some(previous) = self.current.replace(PendingFamily::new(name)) {
                self.closed.insert(previous.family.name.clone());
                self.ready = Some(previous.family);
            }
        }
        Ok(self
            .current
            .get_or_insert_with(|| PendingFamily::new(name)))
    }
}

impl<'a> Iterator for Decoder<'a> {
    type Item = std::result::Result<MetricFamily, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(family) = self.ready.take() {
                return Some(Ok(family));
            }
            if let Some(error) = self.error.take() {
                return Some(Err(error));
            }
            if self.done {
                return None;
            }
            match self.lines.next() {
                Some((index, line)) => {
                    if let Err(kind) = self.decode_line(line) {
                        let owner = self.family_of_line(line);
                        if let Some(pending) = self.current.take() {
                            if pending.family.name != owner {
                                self.ready = Some(pending.family);
                            }
                        }
                        self.error = Some(DecodeError {
                            line: index + 1,
                            kind,
                        });
                        self.done = true;
                    }
                }
                None => {
                    self.ready = self.current.take().map(|pending| pending.family);
                    self.done = true;
                }
            }
        }
    }
}

/// Splits off the first whitespace separated token.
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Parses `name="value",...}` (the opening brace already consumed) and
/// returns the labels together with the remaining input.
fn parse_labels(mut s: &str) -> Result<(Labels, &str)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    loop {
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix('}') {
            return Ok((Labels::new(pairs), rest));
        }
        if s.is_empty() {
            return Err(DecodeErrorKind::UnterminatedLabels);
        }

        let name_end = s
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(s.len());
        let (name, rest) = s.split_at(name_end);
        if !is_valid_label_name(name) {
            let (token, _) = split_token(s);
            return Err(DecodeErrorKind::InvalidLabelName(token.to_owned()));
        }
        let rest = rest
            .trim_start()
            .strip_prefix('=')
            .ok_or_else(|| DecodeErrorKind::UnexpectedInput(rest.to_owned()))?;
        let rest = rest
            .trim_start()
            .strip_prefix('"')
            .ok_or_else(|| DecodeErrorKind::UnexpectedInput(rest.to_owned()))?;
        let (value, rest) = read_label_value(rest)?;
        if pairs.iter().any(|(n, _)| n == name) {
            return Err(DecodeErrorKind::DuplicateLabel(name.to_owned()));
        }
        pairs.push((name.to_owned(), value));

        let rest = rest.trim_start();
        s = match rest.strip_prefix(',') {
            Some(rest) => rest,
            None if rest.starts_with('}') => rest,
            None if rest.is_empty() => return Err(DecodeErrorKind::UnterminatedLabels),
            None => return Err(DecodeErrorKind::UnexpectedInput(rest.to_owned())),
        };
    }
}

/// Reads a label value up to its closing quote.
fn read_label_value(s: &str) -> Result<(String, &str)> {
    let mut value = String::new();
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &s[i + 1..])),
            '\\' => match chars.next() {
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, 'n')) => value.push('\n'),
                Some((_, c)) => return Err(DecodeErrorKind::InvalidEscape(c)),
                None => break,
            },
            c => value.push(c),
        }
    }
    Err(DecodeErrorKind::UnterminatedLabelValue)
}

fn unescape_help(s: &str) -> Result<String> {
    let mut help = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            help.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => help.push('\\'),
            Some('n') => help.push('\n'),
            Some(c) => return Err(DecodeErrorKind::InvalidEscape(c)),
            None => help.push('\\'),
        }
    }
    Ok(help)
}

fn parse_value(s: &str) -> Result<f64> {
    match s {
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ => s
            .parse::<f64>()
            .map_err(|_| DecodeErrorKind::InvalidValue(s.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"
# HELP component_received_events_total component_received_events_total
# TYPE component_received_events_total counter
component_received_events_total{l1="v1"} 10 1735054883000
component_received_events_total{l1="v1",l2="v2"} 20 1735054879000
component_received_events_total{l1="v1",l2="v2",l3="v3"} 30 1735054866000
# HELP component_received_event_bytes_total component_received_event_bytes_total
# TYPE component_received_event_bytes_total counter
component_received_event_bytes_total{l1="v1"} 1000 1735054883000
component_received_event_bytes_total{l1="v1",l2="v2"} 2000 1735054879000
component_received_event_bytes_total{l1="v1",l2="v2",l3="v3"} 3000 1735054866000
"#;

    fn decode_all(text: &str) -> Vec<std::result::Result<MetricFamily, DecodeError>> {
        Decoder::new(text).collect()
    }

    #[test]
    fn test_decode_families() {
        let families = decode_all(SNAPSHOT)
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(families.len(), 2);

        let events = &families[0];
        assert_eq!(events.name, "component_received_events_total");
        assert_eq!(events.help, "component_received_events_total");
        assert_eq!(events.kind, MetricKind::Counter);
        assert_eq!(events.observations.len(), 3);
        assert_eq!(events.observations[1].value, 20.0);
        assert_eq!(events.observations[1].timestamp, Some(1735054879000));
        assert_eq!(
            events.observations[2].labels.to_string(),
            r#"{l1="v1",l2="v2",l3="v3"}"#
        );

        assert_eq!(families[1].name, "component_received_event_bytes_total");
        assert_eq!(families[1].observations[0].value, 1000.0);
    }

    #[test]
    fn test_decode_untyped_without_metadata() {
        let families = decode_all("up 1\nup{job=\"a\",} 0\n");
        assert_eq!(families.len(), 1);
        let up = families[0].as_ref().unwrap();
        assert_eq!(up.kind, MetricKind::Untyped);
        assert_eq!(up.help, "");
        assert_eq!(up.observations.len(), 2);
        assert!(up.observations[0].labels.is_empty());
        assert_eq!(up.observations[1].labels.get("job"), Some("a"));
        assert_eq!(up.observations[1].timestamp, None);
    }

    #[test]
    fn test_decode_special_values_and_escapes() {
        let text = concat!(
            "# HELP m line one\\nline \\\\two\n",
            "# TYPE m gauge\n",
            "m{a=\"x\\\"y\\\\z\\nw\"} +Inf\n",
            "m{a=\"2\"} -Inf\n",
            "m{a=\"3\"} NaN\n",
            "m{a=\"4\"} 1.5e3\n",
        );
        let family = decode_all(text).remove(0).unwrap();
        assert_eq!(family.help, "line one\nline \\two");
        assert_eq!(family.observations[0].labels.get("a"), Some("x\"y\\z\nw"));
        assert_eq!(family.observations[0].value, f64::INFINITY);
        assert_eq!(family.observations[1].value, f64::NEG_INFINITY);
        assert!(family.observations[2].value.is_nan());
        assert_eq!(family.observations[3].value, 1500.0);
    }

    #[test]
    fn test_decode_histogram_sub_series() {
        let text = r#"
# TYPE rpc_seconds histogram
rpc_seconds_bucket{le="0.1"} 1
rpc_seconds_bucket{le="+Inf"} 3
rpc_seconds_sum 0.7
rpc_seconds_count 3
# TYPE rpc_size summary
rpc_size{quantile="0.5"} 12
rpc_size_sum 40
rpc_size_count 3
rpc_seconds_total 5
"#;
        let families = decode_all(text)
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        let got = families
            .iter()
            .map(|f| (f.name.as_str(), f.kind, f.observations.len()))
            .collect::<Vec<_>>();
        assert_eq!(
            got,
            vec![
                ("rpc_seconds", MetricKind::Histogram, 4),
                ("rpc_size", MetricKind::Summary, 3),
                ("rpc_seconds_total", MetricKind::Untyped, 1),
            ]
        );
    }

    #[test]
    fn test_decode_keeps_families_before_error() {
        let text = r#"
# TYPE a counter
a{x="1"} 1
# TYPE b gauge
b{x="1"} 2
b{x="2" 3
# TYPE c gauge
c 4
"#;
        let mut decoder = Decoder::new(text);
        assert_eq!(decoder.next().unwrap().unwrap().name, "a");
        let err = decoder.next().unwrap().unwrap_err();
        assert_eq!(err.line, 6);
        assert_eq!(
            err.kind,
            DecodeErrorKind::UnexpectedInput("3".to_owned())
        );
        assert!(decoder.next().is_none());
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_decode_error_after_family_switch_keeps_previous() {
        let mut decoder = Decoder::new("a 1\n# TYPE b bogus\n");
        assert_eq!(decoder.next().unwrap().unwrap().name, "a");
        let err = decoder.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), r#"line 2: unknown metric type "bogus""#);
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_decode_invalid_name_keeps_previous_family() {
        for text in ["a 1\n1bad 2\n", "a 1\n# TYPE 9x counter\n", "a 1\n{x=\"1\"} 2\n"] {
            let mut decoder = Decoder::new(text);
            let a = decoder.next().unwrap().unwrap();
            assert_eq!(a.name, "a", "input {text:?}");
            assert_eq!(a.observations.len(), 1);
            let err = decoder.next().unwrap().unwrap_err();
            assert_eq!(err.line, 2);
            assert!(matches!(err.kind, DecodeErrorKind::InvalidMetricName(_)));
            assert!(decoder.next().is_none());
        }
    }

    #[test]
    fn test_decode_every_error_keeps_finished_families() {
        const PREVIOUS: &str = "# TYPE prev counter\nprev{x=\"1\"} 1\nprev{x=\"2\"} 2\n";
        let cases = [
            ("1bad 2", vec!["prev"], DecodeErrorKind::InvalidMetricName("1bad".to_owned())),
            ("# HELP 9x h", vec!["prev"], DecodeErrorKind::InvalidMetricName("9x".to_owned())),
            ("m{1a=\"x\"} 1", vec!["prev"], DecodeErrorKind::InvalidLabelName("1a=\"x\"}".to_owned())),
            ("m{a=\"x\",a=\"y\"} 1", vec!["prev"], DecodeErrorKind::DuplicateLabel("a".to_owned())),
            ("m{a=\"x\"", vec!["prev"], DecodeErrorKind::UnterminatedLabels),
            ("m{a=\"x", vec!["prev"], DecodeErrorKind::UnterminatedLabelValue),
            ("m{a=\"\\t\"} 1", vec!["prev"], DecodeErrorKind::InvalidEscape('t')),
            ("m one", vec!["prev"], DecodeErrorKind::InvalidValue("one".to_owned())),
            ("m 1 soon", vec!["prev"], DecodeErrorKind::InvalidTimestamp("soon".to_owned())),
            ("m 1 2 3", vec!["prev"], DecodeErrorKind::UnexpectedInput("3".to_owned())),
            ("# TYPE m bogus", vec!["prev"], DecodeErrorKind::UnknownType("bogus".to_owned())),
            ("# HELP m a\n# HELP m b", vec!["prev"], DecodeErrorKind::DuplicateHelp("m".to_owned())),
            ("# TYPE m gauge\n# TYPE m gauge", vec!["prev"], DecodeErrorKind::DuplicateType("m".to_owned())),
            ("m 1\n# TYPE m gauge", vec!["prev"], DecodeErrorKind::TypeAfterSamples("m".to_owned())),
            ("m 1\nprev 3", vec!["prev", "m"], DecodeErrorKind::FamilyReopened("prev".to_owned())),
        ];
        for (bad, finished, kind) in cases {
            let text = format!("{PREVIOUS}{bad}\n");
            let results = decode_all(&text);
            let (ok, err): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_ok());
            let ok = ok.into_iter().map(|r| r.unwrap()).collect::<Vec<_>>();
            let names = ok.iter().map(|f| f.name.as_str()).collect::<Vec<_>>();
            assert_eq!(names, finished, "input {bad:?}");
            assert_eq!(ok[0].observations.len(), 2, "input {bad:?}");
            assert_eq!(err.len(), 1, "input {bad:?}");
            assert_eq!(err[0].as_ref().unwrap_err().kind, kind, "input {bad:?}");
        }
    }

    #[test]
    fn test_decode_errors() {
        let cases = [
            ("1abc 1", DecodeErrorKind::InvalidMetricName("1abc".to_owned())),
            ("m{1a=\"x\"} 1", DecodeErrorKind::InvalidLabelName("1a=\"x\"}".to_owned())),
            ("m{a=\"x\",a=\"y\"} 1", DecodeErrorKind::DuplicateLabel("a".to_owned())),
            ("m{a=\"x\"", DecodeErrorKind::UnterminatedLabels),
            ("m{a=\"x", DecodeErrorKind::UnterminatedLabelValue),
            ("m{a=\"\\t\"} 1", DecodeErrorKind::InvalidEscape('t')),
            ("m one", DecodeErrorKind::InvalidValue("one".to_owned())),
            ("m", DecodeErrorKind::InvalidValue(String::new())),
            ("m 1 soon", DecodeErrorKind::InvalidTimestamp("soon".to_owned())),
            ("m 1 2 3", DecodeErrorKind::UnexpectedInput("3".to_owned())),
            ("# HELP m a\n# HELP m b", DecodeErrorKind::DuplicateHelp("m".to_owned())),
            ("# TYPE m gauge\n# TYPE m gauge", DecodeErrorKind::DuplicateType("m".to_owned())),
            ("m 1\n# TYPE m gauge", DecodeErrorKind::TypeAfterSamples("m".to_owned())),
            ("m 1\nn 1\nm 2", DecodeErrorKind::FamilyReopened("m".to_owned())),
        ];
        for (text, kind) in cases {
            let err = decode_all(text)
                .into_iter()
                .find_map(|r| r.err())
                .unwrap_or_else(|| panic!("no error for {text:?}"));
            assert_eq!(err.kind, kind, "input {text:?}");
        }
    }

    #[test]
    fn test_decode_ignores_comments_and_blank_lines() {
        let families = decode_all("\n# just a comment\n   \nm 1\n#\n");
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].as_ref().unwrap().observations.len(), 1);
        assert!(decode_all("").is_empty());
    }
}

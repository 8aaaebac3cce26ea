use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use aggregator::{HttpFetcher, Labels, RelabelConfig, RemoteAggregator, SelfMetrics};
use clap::Parser;
use color_eyre::eyre::{ensure, Result, WrapErr};
use rustc_hash::FxHashSet;

pub mod api;
pub mod http;

/// Aggregate metrics to reduce cardinality by removing labels.
#[derive(Debug, Parser)]
#[command(name = "metrics-aggregator", version)]
pub struct Cli {
    /// The address the metric endpoint binds to.
    #[arg(long, default_value = ":9090", value_parser = parse_bind_address)]
    pub metrics_bind_address: SocketAddr,

    /// The path under which to expose metrics.
    #[arg(long, default_value = "/metrics", value_parser = parse_metrics_path)]
    pub metrics_path: String,

    /// The remote target metrics url to scrape metrics from.
    #[arg(long)]
    pub target_url: String,

    /// Seconds to wait for the remote target before giving up on a scrape.
    #[arg(long, default_value_t = 10)]
    pub target_timeout: u64,

    /// The metrics will be aggregated over all labels except listed labels.
    /// Listed labels are removed from the result vector, all other labels
    /// are preserved in the output.
    #[arg(long = "aggregate-without-label", required = true, value_delimiter = ',')]
    pub aggregate_without_labels: Vec<String>,

    /// The name of the scraped metrics which will be aggregated and exported.
    /// If not set, all metrics are exported from the target.
    #[arg(long = "include-metric", value_delimiter = ',')]
    pub include_metrics: Vec<String>,

    /// The prefix which will be added to all exported metric names.
    #[arg(long, default_value = "")]
    pub add_prefix: String,

    /// The list of key=value pairs which will be added to all exported metrics.
    #[arg(long = "add-labelValue", value_delimiter = ',', value_parser = parse_label_value)]
    pub add_label_values: Vec<(String, String)>,
}

impl Cli {
    pub fn relabel_config(&self) -> Result<RelabelConfig> {
        let drop_labels = self
            .aggregate_without_labels
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect::<FxHashSet<_>>();
        ensure!(
            !drop_labels.is_empty(),
            "--aggregate-without-label needs at least one label name"
        );
        Ok(RelabelConfig {
            include_metrics: self
                .include_metrics
                .iter()
                .filter(|name| !name.is_empty())
                .cloned()
                .collect(),
            drop_labels,
            prefix: self.add_prefix.clone(),
            extra_labels: Labels::new(
                self.add_label_values
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            ),
        })
    }

    /// Builds everything the metrics endpoint needs.
    pub fn app_state(&self) -> Result<Arc<AppState>> {
        let config = Arc::new(self.relabel_config()?);
        let fetcher = HttpFetcher::new(&self.target_url, Duration::from_secs(self.target_timeout))
            .wrap_err("failed to create target client")?;
        let metrics = SelfMetrics::new().wrap_err("failed to register self metrics")?;
        Ok(Arc::new(AppState {
            aggregator: RemoteAggregator::new(Arc::new(fetcher), config, metrics),
        }))
    }
}

pub struct AppState {
    pub aggregator: RemoteAggregator,
}

/// Accepts `host:port`, or `:port` for every interface.
fn parse_bind_address(s: &str) -> Result<SocketAddr, String> {
    match s.strip_prefix(':') {
        Some(port) => port
            .parse::<u16>()
            .map(|port| SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
            .map_err(|e| format!("invalid port {port:?}: {e}")),
        None => s.parse().map_err(|e| format!("invalid address {s:?}: {e}")),
    }
}

fn parse_metrics_path(s: &str) -> Result<String, String> {
    if s.starts_with('/') {
        Ok(s.to_owned())
    } else {
        Err(format!("path {s:?} must start with '/'"))
    }
}

fn parse_label_value(s: &str) -> Result<(String, String), String> {
    match s.split('=').collect::<Vec<_>>()[..] {
        [key, value] if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

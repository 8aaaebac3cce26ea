use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use crate::{
    exposition::{encode, to_families, Decoder},
    metrics::{is_reserved_name, SelfMetrics},
    pipeline::RelabelConfig,
    value::EmittedSeries,
    FetchError,
};

/// Source of upstream snapshots.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Identity of the upstream, used to label self metrics and logs.
    fn remote(&self) -> &str;

    /// Returns one snapshot body in text exposition format.
    async fn fetch(&self) -> Result<String, FetchError>;
}

/// Fetches snapshots with a plain HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    url: Url,
    remote: String,
}

impl HttpFetcher {
    /// Every request, body included, is bounded by `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: parsed,
            remote: url.to_owned(),
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    fn remote(&self) -> &str {
        &self.remote
    }

    async fn fetch(&self) -> Result<String, FetchError> {
        let resp = self.client.get(self.url.clone()).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status(resp.status()));
        }
        Ok(resp.text().await?)
    }
}

/// Pulls the upstream snapshot and relabels it, once per scrape.
pub struct RemoteAggregator {
    fetcher: Arc<dyn Fetch>,
    config: Arc<RelabelConfig>,
    metrics: SelfMetrics,
}

impl RemoteAggregator {
    pub fn new(fetcher: Arc<dyn Fetch>, config: Arc<RelabelConfig>, metrics: SelfMetrics) -> Self {
        Self {
            fetcher,
            config,
            metrics,
        }
    }

    pub fn metrics(&self) -> &SelfMetrics {
        &self.metrics
    }

    /// Serves one downstream scrape: the relabeled snapshot followed by the
    /// self metrics, encoded as a single exposition.
    ///
    /// Relabeled families named like a self metric are left out.
    pub async fn scrape(&self) -> String {
        let series = self.collect().await;
        let mut families = to_families(&series);
        families.retain(|family| {
            let reserved = is_reserved_name(family.get_name());
            if reserved {
                tracing::error!(
                    metric = family.get_name(),
                    "relabeled family collides with a self metric, skipping"
                );
            }
            !reserved
        });
        families.extend(self.metrics.gather());
        encode(&families)
    }

    /// Runs one collection cycle.
    ///
    /// Never fails: fetch and decode errors are logged and leave the result
    /// empty or partial. The cycle duration is observed on every path.
    #[tracing::instrument(skip_all, fields(remote = %self.fetcher.remote()))]
    pub async fn collect(&self) -> Vec<EmittedSeries> {
        let _timer = self.metrics.start_collection(self.fetcher.remote());

        let body = match self.fetcher.fetch().await {
            Ok(body) => body,
            Err(error) => {
                tracing::error!(%error, "error fetching metrics");
                return Vec::new();
            }
        };
        self.decode_and_process(&body)
    }

    /// Relabels every family of `body` up to its first malformed line.
    /// The result is ordered by metric name.
    pub fn decode_and_process(&self, body: &str) -> Vec<EmittedSeries> {
        let mut series = Vec::new();
        for family in Decoder::new(body) {
            match family {
                Ok(family) => series.extend(self.config.process(&family)),
                Err(error) => {
                    tracing::error!(%error, "error decoding metric family");
                    break;
                }
            }
        }
        series.sort_by(|a, b| a.name.cmp(&b.name));
        series
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP clients for the timeline metrics collector.
//!
//! Batches are posted as JSON to `http://{host}:{port}/ws/v1/timeline/metrics`. Any non-2xx
//! answer is reported as [`TransportError::Status`]; nothing here retries.

use std::fmt;
use std::net::Ipv6Addr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use tracing::debug;

use crate::constants::{COLLECTOR_PATH, DEFAULT_COLLECTOR_PORT};
use crate::errors::TransportError;
use crate::timeline::TimelineMetrics;

/// Blocking transport capability consumed by [`crate::sink::SyncSink`].
pub trait MetricsTransport: Send + Sync {
    fn put_metrics(&self, metrics: &TimelineMetrics) -> Result<(), TransportError>;
}

/// Async transport capability consumed by [`crate::sink::AsyncSink`].
#[async_trait]
pub trait AsyncMetricsTransport: Send + Sync {
    async fn put_metrics(&self, metrics: &TimelineMetrics) -> Result<(), TransportError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorUrl(String);

impl CollectorUrl {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        if host.parse::<Ipv6Addr>().is_ok() {
            return CollectorUrl(format!("http://[{host}]:{port}{COLLECTOR_PATH}"));
        }
        CollectorUrl(format!("http://{host}:{port}{COLLECTOR_PATH}"))
    }

    /// Uses `base` (scheme, host and port, e.g. a mock server) in front of the collector path.
    #[must_use]
    pub fn with_base(base: &str) -> Self {
        CollectorUrl(format!("{}{COLLECTOR_PATH}", base.trim_end_matches('/')))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CollectorUrl {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_COLLECTOR_PORT)
    }
}

impl fmt::Display for CollectorUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Collector client for the synchronous writer. Blocks the calling thread for the request.
///
/// Must not be created, used or dropped on an async runtime thread.
#[derive(Clone, Debug)]
pub struct BlockingCollectorClient {
    client: reqwest::blocking::Client,
    url: CollectorUrl,
}

impl BlockingCollectorClient {
    pub fn new(url: CollectorUrl, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .default_headers(json_headers())
            .build()?;
        Ok(BlockingCollectorClient { client, url })
    }

    #[must_use]
    pub fn url(&self) -> &CollectorUrl {
        &self.url
    }
}

impl MetricsTransport for BlockingCollectorClient {
    fn put_metrics(&self, metrics: &TimelineMetrics) -> Result<(), TransportError> {
        debug!("Posting {} timeline metrics to {}", metrics.len(), self.url);
        let response = self.client.post(self.url.as_str()).json(metrics).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(TransportError::Status(status, body))
    }
}

/// Collector client for the asynchronous writer.
#[derive(Clone, Debug)]
pub struct CollectorClient {
    client: reqwest::Client,
    url: CollectorUrl,
}

impl CollectorClient {
    pub fn new(url: CollectorUrl, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .default_headers(json_headers())
            .build()?;
        Ok(CollectorClient { client, url })
    }

    #[must_use]
    pub fn url(&self) -> &CollectorUrl {
        &self.url
    }
}

#[async_trait]
impl AsyncMetricsTransport for CollectorClient {
    async fn put_metrics(&self, metrics: &TimelineMetrics) -> Result<(), TransportError> {
        debug!("Posting {} timeline metrics to {}", metrics.len(), self.url);
        let response = self
            .client
            .post(self.url.as_str())
            .json(metrics)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status(status, body))
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Flush orchestration.
//!
//! [`MetricWriter`] buffers samples and, once more than `buffer_size` are held, drains the
//! buffer into a pooled batch and hands it to its [`Sink`]:
//!
//! ```text
//!   idle ──(size > buffer_size or flush_now)──> draining ──> building ──> dispatching
//!     ^                                                                        │
//!     └──────────────────────────── releasing <────────────────────────────────┘
//! ```
//!
//! A flush that finds nothing to send stops after draining. Every failure on this path is
//! logged and the affected data dropped; none of it reaches the caller of [`MetricWriter::set`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::buffer::MetricBuffer;
use crate::collector::{BlockingCollectorClient, CollectorClient};
use crate::config::{WriterConfig, WriterType};
use crate::errors::{ConfigError, WriterError};
use crate::metric::{MetricKind, MetricValue, Sample};
use crate::pool::MetricObjectPool;
use crate::sink::{AsyncSink, Dispatch, LoggingSink, Sink, SyncSink};

pub struct MetricWriter {
    app_id: String,
    host_name: String,
    instance_id: Option<String>,
    buffer_size: AtomicUsize,
    buffer: MetricBuffer,
    pool: MetricObjectPool,
    sink: Arc<dyn Sink>,
}

impl MetricWriter {
    /// Creates a writer dispatching to `sink`. The configured writer type is ignored.
    pub fn new(config: &WriterConfig, sink: Arc<dyn Sink>) -> Self {
        MetricWriter {
            app_id: config.application_id.clone(),
            host_name: config.host_name.clone(),
            instance_id: config.instance_id.clone(),
            buffer_size: AtomicUsize::new(config.buffer_size),
            buffer: MetricBuffer::new(config.lock_timeout),
            pool: MetricObjectPool::with_max_wait(
                config.metrics_pool_size,
                config.metric_pool_size(),
                config.acquisition_timeout,
            ),
            sink,
        }
    }

    /// Creates a writer with the sink selected by `config.writer_type`.
    ///
    /// The `async` writer spawns onto `runtime`, or onto the current runtime when `None`.
    /// The `sync` writer owns a blocking HTTP client and must be created outside of any
    /// async execution context.
    pub fn from_config(
        config: &WriterConfig,
        runtime: Option<Handle>,
    ) -> Result<Self, WriterError> {
        config.validate()?;

        let sink: Arc<dyn Sink> = match config.writer_type {
            WriterType::Sync => {
                let url = config
                    .collector_url()
                    .ok_or(ConfigError::Missing("collector host", "sync"))?;
                let client = BlockingCollectorClient::new(url, config.request_timeout)?;
                Arc::new(SyncSink::new(client))
            }
            WriterType::Async => {
                let url = config
                    .collector_url()
                    .ok_or(ConfigError::Missing("collector host", "async"))?;
                let runtime = runtime
                    .or_else(|| Handle::try_current().ok())
                    .ok_or(ConfigError::NoRuntime)?;
                let client = CollectorClient::new(url, config.request_timeout)?;
                Arc::new(AsyncSink::new(client, runtime))
            }
            WriterType::Dummy => Arc::new(LoggingSink),
        };

        debug!(
            "Created {} metric writer with buffer size {}",
            config.writer_type, config.buffer_size
        );
        Ok(Self::new(config, sink))
    }

    /// Buffers `sample` and flushes once more than `buffer_size` samples are held.
    ///
    /// Returns the completion token of the flush this call triggered, if any.
    pub fn set(&self, sample: Sample) -> Option<Dispatch> {
        if let Err(e) = self.buffer.add_sample(&sample) {
            warn!("Dropping sample for {}: {e}", sample.name);
            return None;
        }
        if self.buffer.size() > self.buffer_size() {
            return self.flush_now();
        }
        None
    }

    pub fn add(
        &self,
        name: &str,
        timestamp: i64,
        value: impl Into<MetricValue>,
    ) -> Option<Dispatch> {
        self.set(Sample::at(name, timestamp, value))
    }

    /// Reports a zero `Long` value for `name` at the current time.
    pub fn reset(&self, name: &str) -> Option<Dispatch> {
        self.set(Sample::new(name, 0_i64))
    }

    /// Not supported: the collector stores absolute values only.
    pub fn increment(&self, sample: Sample) -> Result<(), WriterError> {
        error!(
            "Increment is not supported, ignoring delta for {}",
            sample.name
        );
        Err(WriterError::UnsupportedOperation("increment"))
    }

    /// Drains the buffer and dispatches its content as one batch.
    ///
    /// Returns `None` when nothing was dispatched: the buffer was empty, or no batch could be
    /// built from it.
    pub fn flush_now(&self) -> Option<Dispatch> {
        if self.buffer.is_empty() {
            return None;
        }
        let snapshot = self.buffer.flush();
        if snapshot.is_empty() {
            return None;
        }

        let mut metrics = match self.pool.get_metrics() {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("Dropping {} metric series: {e}", snapshot.len());
                return None;
            }
        };

        let mut series: Vec<_> = snapshot.into_iter().collect();
        series.sort_unstable_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));

        for (name, values) in series {
            let metric = match metrics.acquire_metric() {
                Ok(metric) => metric,
                Err(e) => {
                    error!("Dropping {} values of {name}: {e}", values.len());
                    continue;
                }
            };
            metric.metric_name.push_str(&name);
            metric.app_id.push_str(&self.app_id);
            metric.host_name.push_str(&self.host_name);
            metric.instance_id.clone_from(&self.instance_id);
            metric.start_time = values.keys().next().copied().unwrap_or(0);
            metric.metric_type = self.buffer.metric_type(&name).map(MetricKind::as_str);
            metric.metric_values = values;
        }

        if metrics.is_empty() {
            return None;
        }
        debug!(
            "Dispatching {} timeline metrics with {} values",
            metrics.len(),
            metrics.value_count()
        );
        Some(self.sink.dispatch(metrics))
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.load(Ordering::Relaxed)
    }

    pub fn set_buffer_size(&self, buffer_size: usize) {
        self.buffer_size.store(buffer_size, Ordering::Relaxed);
    }

    #[must_use]
    pub fn buffer(&self) -> &MetricBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn pool(&self) -> &MetricObjectPool {
        &self.pool
    }
}

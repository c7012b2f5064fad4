// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Upper bound for every blocking wait on the ingestion path.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Samples buffered before an automatic flush.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Maximum number of `TimelineMetrics` batches outstanding at once.
pub const DEFAULT_METRICS_POOL_SIZE: usize = 1000;

/// Floor for the `TimelineMetric` pool size, which otherwise scales with the buffer size.
pub const MIN_METRIC_POOL_SIZE: usize = 1000;

/// Records per buffered sample reserved in the record pool.
pub const METRIC_POOL_FACTOR: usize = 10;

pub const DEFAULT_COLLECTOR_PORT: u16 = 6188;

pub const COLLECTOR_PATH: &str = "/ws/v1/timeline/metrics";

/// Sentinel start time of a passivated record.
pub const UNSET_START_TIME: i64 = -1;

#[must_use]
pub fn metric_pool_size_for(buffer_size: usize) -> usize {
    MIN_METRIC_POOL_SIZE.max(buffer_size.saturating_mul(METRIC_POOL_FACTOR))
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Payload types posted to the timeline metrics collector.
//!
//! Both types are pooled (see [`crate::pool`]) and reset to their empty state by
//! [`Poolable::passivate`] before they are handed out again.

use serde::Serialize;

use crate::buffer::Series;
use crate::constants::UNSET_START_TIME;
use crate::pool::Poolable;

/// One metric name within a batch, with its identity fields and buffered values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimelineMetric {
    #[serde(rename = "metricname")]
    pub metric_name: String,
    #[serde(rename = "appid")]
    pub app_id: String,
    #[serde(rename = "hostname")]
    pub host_name: String,
    #[serde(rename = "instanceid", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(rename = "starttime")]
    pub start_time: i64,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<&'static str>,
    #[serde(rename = "metrics")]
    pub metric_values: Series,
}

impl Default for TimelineMetric {
    fn default() -> Self {
        TimelineMetric {
            metric_name: String::new(),
            app_id: String::new(),
            host_name: String::new(),
            instance_id: None,
            start_time: UNSET_START_TIME,
            metric_type: None,
            metric_values: Series::new(),
        }
    }
}

impl Poolable for TimelineMetric {
    fn passivate(&mut self) {
        // clear() keeps the string allocations for the next borrower
        self.metric_name.clear();
        self.app_id.clear();
        self.host_name.clear();
        self.instance_id = None;
        self.start_time = UNSET_START_TIME;
        self.metric_type = None;
        self.metric_values.clear();
    }
}

impl TimelineMetric {
    #[must_use]
    pub fn is_passivated(&self) -> bool {
        *self == TimelineMetric::default()
    }
}

/// A dispatch-ready batch of [`TimelineMetric`] records.
///
/// Records can only be added through [`crate::pool::PooledTimelineMetrics::acquire_metric`],
/// which keeps the record pool accounting exact.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TimelineMetrics {
    pub(crate) metrics: Vec<TimelineMetric>,
}

impl TimelineMetrics {
    #[must_use]
    pub fn metrics(&self) -> &[TimelineMetric] {
        &self.metrics
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Total number of values across all records.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.metrics.iter().map(|m| m.metric_values.len()).sum()
    }
}

impl Poolable for TimelineMetrics {
    fn passivate(&mut self) {
        self.metrics.clear();
    }
}

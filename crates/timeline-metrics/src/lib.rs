// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client-side aggregation and dispatch of timeline metrics.
//!
//! Applications report samples to a [`writer::MetricWriter`], which groups them per metric
//! name in a [`buffer::MetricBuffer`]. Once enough samples are buffered, or when the caller
//! asks for it, the buffer is drained into a pooled [`timeline::TimelineMetrics`] batch and
//! handed to a [`sink::Sink`] that posts it to the collector, logs it, or both.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod collector;
pub mod config;
pub mod constants;
pub mod errors;
pub mod metric;
pub mod pool;
pub mod sink;
pub mod timeline;
pub mod writer;

pub use config::{WriterConfig, WriterType};
pub use metric::{MetricValue, Sample};
pub use writer::MetricWriter;

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the timeline metrics pipeline.
//!
//! None of these errors are fatal to the reporting application. The writer logs them and
//! drops the affected sample, record or batch. The exception is
//! [`WriterError::UnsupportedOperation`], which flags a programming error at the call site.

use std::time::Duration;

use reqwest::StatusCode;

/// Failure to buffer or drain samples.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("metric buffer lock not acquired within {0:?}")]
    LockTimeout(Duration),
}

/// Failure to borrow an object from a [`crate::pool::ObjectPool`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("{pool} pool exhausted, no object available after {waited:?}")]
    Exhausted { pool: &'static str, waited: Duration },
    #[error("{pool} pool is closed")]
    Closed { pool: &'static str },
}

/// Failure reported by a metrics transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to metrics collector failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("metrics collector responded with {0}: {1}")]
    Status(StatusCode, String),
    #[error("failed to serialize timeline metrics: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("dispatch task ended before reporting a result")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by [`crate::writer::MetricWriter`] to its caller.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    #[error("invalid writer configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to create metrics collector client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Invalid writer configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("writer type must be one of: sync, async or dummy, got '{0}'")]
    InvalidWriterType(String),
    #[error("{0} must be set for the {1} writer")]
    Missing(&'static str, &'static str),
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("{0} must be greater than 0")]
    Zero(&'static str),
    #[error("failed to parse {0}: '{1}'")]
    Parse(&'static str, String),
    #[error("the async writer requires a tokio runtime")]
    NoRuntime,
}

/// Failure to parse a sample from its line representation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing ':' between metric name and value")]
    MissingValue,
    #[error("metric name is empty")]
    EmptyName,
    #[error("invalid metric value '{0}'")]
    InvalidValue(String),
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("unknown field '{0}'")]
    UnknownField(String),
}

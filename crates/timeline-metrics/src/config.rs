// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::collector::CollectorUrl;
use crate::constants::{
    metric_pool_size_for, DEFAULT_BUFFER_SIZE, DEFAULT_COLLECTOR_PORT, DEFAULT_METRICS_POOL_SIZE,
    DEFAULT_WAIT,
};
use crate::errors::ConfigError;

/// How flushed batches leave the process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriterType {
    /// Posts on the flushing thread.
    #[default]
    Sync,
    /// Posts from a task on a tokio runtime.
    Async,
    /// Logs batches instead of posting them.
    Dummy,
}

impl WriterType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            WriterType::Sync => "sync",
            WriterType::Async => "async",
            WriterType::Dummy => "dummy",
        }
    }
}

impl FromStr for WriterType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sync" => Ok(WriterType::Sync),
            "async" => Ok(WriterType::Async),
            "dummy" => Ok(WriterType::Dummy),
            _ => Err(ConfigError::InvalidWriterType(s.to_string())),
        }
    }
}

impl fmt::Display for WriterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a [`crate::writer::MetricWriter`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterConfig {
    /// Collector host. Required unless the writer type is `dummy`
    pub collector_host: Option<String>,
    pub collector_port: u16,
    /// Application id reported on every record
    pub application_id: String,
    /// Host name reported on every record
    pub host_name: String,
    pub instance_id: Option<String>,
    /// Samples buffered before a flush is triggered
    pub buffer_size: usize,
    pub writer_type: WriterType,
    /// Maximum number of batches alive at once
    pub metrics_pool_size: usize,
    /// Maximum number of records alive at once. Derived from `buffer_size` when unset
    pub metric_pool_size: Option<usize>,
    /// Longest wait for a pooled object
    pub acquisition_timeout: Duration,
    /// Longest wait for the buffer lock
    pub lock_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            collector_host: None,
            collector_port: DEFAULT_COLLECTOR_PORT,
            application_id: "application".to_string(),
            host_name: "localhost".to_string(),
            instance_id: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            writer_type: WriterType::Sync,
            metrics_pool_size: DEFAULT_METRICS_POOL_SIZE,
            metric_pool_size: None,
            acquisition_timeout: DEFAULT_WAIT,
            lock_timeout: DEFAULT_WAIT,
            request_timeout: DEFAULT_WAIT,
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Parse(name, raw)),
        Err(_) => Ok(None),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

impl WriterConfig {
    /// Create configuration from `TIMELINE_METRICS_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let collector_host = non_empty_var("TIMELINE_METRICS_COLLECTOR_HOST");
        let collector_port = parse_var("TIMELINE_METRICS_COLLECTOR_PORT")?
            .unwrap_or(defaults.collector_port);
        let application_id = non_empty_var("TIMELINE_METRICS_APPLICATION_ID")
            .unwrap_or(defaults.application_id);
        let host_name = non_empty_var("TIMELINE_METRICS_HOST_NAME")
            .or_else(|| non_empty_var("HOSTNAME"))
            .unwrap_or(defaults.host_name);
        let instance_id = non_empty_var("TIMELINE_METRICS_INSTANCE_ID");
        let buffer_size =
            parse_var("TIMELINE_METRICS_BUFFER_SIZE")?.unwrap_or(defaults.buffer_size);
        let writer_type =
            parse_var("TIMELINE_METRICS_WRITER_TYPE")?.unwrap_or(defaults.writer_type);

        let config = Self {
            collector_host,
            collector_port,
            application_id,
            host_name,
            instance_id,
            buffer_size,
            writer_type,
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_id.trim().is_empty() {
            return Err(ConfigError::Empty("application id"));
        }
        if self.host_name.trim().is_empty() {
            return Err(ConfigError::Empty("host name"));
        }
        if self.metrics_pool_size == 0 {
            return Err(ConfigError::Zero("metrics pool size"));
        }
        if self.metric_pool_size == Some(0) {
            return Err(ConfigError::Zero("metric pool size"));
        }

        if self.writer_type != WriterType::Dummy {
            match self.collector_host.as_deref().map(str::trim) {
                None => {
                    return Err(ConfigError::Missing(
                        "collector host",
                        self.writer_type.as_str(),
                    ))
                }
                Some("") => return Err(ConfigError::Empty("collector host")),
                Some(_) => {}
            }
            if self.collector_port == 0 {
                return Err(ConfigError::Zero("collector port"));
            }
        }

        Ok(())
    }

    /// Record pool size: the configured value, or `max(1000, 10 * buffer_size)`.
    #[must_use]
    pub fn metric_pool_size(&self) -> usize {
        self.metric_pool_size
            .unwrap_or_else(|| metric_pool_size_for(self.buffer_size))
    }

    #[must_use]
    pub fn collector_url(&self) -> Option<CollectorUrl> {
        self.collector_host
            .as_deref()
            .map(|host| CollectorUrl::new(host.trim(), self.collector_port))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use duplicate::duplicate_item;
    use serial_test::serial;

    const VARS: [&str; 8] = [
        "TIMELINE_METRICS_COLLECTOR_HOST",
        "TIMELINE_METRICS_COLLECTOR_PORT",
        "TIMELINE_METRICS_APPLICATION_ID",
        "TIMELINE_METRICS_HOST_NAME",
        "TIMELINE_METRICS_INSTANCE_ID",
        "TIMELINE_METRICS_BUFFER_SIZE",
        "TIMELINE_METRICS_WRITER_TYPE",
        "HOSTNAME",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_needs_collector_host() {
        let config = WriterConfig::default();
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("collector host", "sync"))
        );

        let config = WriterConfig {
            writer_type: WriterType::Dummy,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let config = WriterConfig {
            collector_host: Some("collector".to_string()),
            application_id: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Empty("application id")));

        let config = WriterConfig {
            collector_host: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Empty("collector host")));

        let config = WriterConfig {
            writer_type: WriterType::Dummy,
            metric_pool_size: Some(0),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("metric pool size")));
    }

    #[test]
    fn test_metric_pool_size() {
        let mut config = WriterConfig::default();
        assert_eq!(config.metric_pool_size(), 1000);

        config.buffer_size = 500;
        assert_eq!(config.metric_pool_size(), 5000);

        config.metric_pool_size = Some(12);
        assert_eq!(config.metric_pool_size(), 12);
    }

    #[duplicate_item(
        test_name                   raw             expected;
        [test_writer_type_sync]     ["sync"]        [WriterType::Sync];
        [test_writer_type_async]    ["ASYNC"]       [WriterType::Async];
        [test_writer_type_dummy]    [" Dummy "]     [WriterType::Dummy];
    )]
    #[test]
    fn test_name() {
        assert_eq!(raw.parse::<WriterType>().unwrap(), expected);
    }

    #[test]
    fn test_invalid_writer_type() {
        assert_eq!(
            "batch".parse::<WriterType>(),
            Err(ConfigError::InvalidWriterType("batch".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        env::set_var("TIMELINE_METRICS_COLLECTOR_HOST", "collector.local");

        let config = WriterConfig::from_env().unwrap();
        assert_eq!(config.collector_port, 6188);
        assert_eq!(config.application_id, "application");
        assert_eq!(config.host_name, "localhost");
        assert_eq!(config.instance_id, None);
        assert_eq!(config.buffer_size, 100);
        assert_eq!(config.writer_type, WriterType::Sync);
        assert_eq!(
            config.collector_url().unwrap().as_str(),
            "http://collector.local:6188/ws/v1/timeline/metrics"
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("TIMELINE_METRICS_COLLECTOR_HOST", "10.0.0.7");
        env::set_var("TIMELINE_METRICS_COLLECTOR_PORT", "7000");
        env::set_var("TIMELINE_METRICS_APPLICATION_ID", "orders");
        env::set_var("HOSTNAME", "pod-1");
        env::set_var("TIMELINE_METRICS_INSTANCE_ID", "blue");
        env::set_var("TIMELINE_METRICS_BUFFER_SIZE", "20");
        env::set_var("TIMELINE_METRICS_WRITER_TYPE", "async");

        let config = WriterConfig::from_env().unwrap();
        assert_eq!(config.collector_port, 7000);
        assert_eq!(config.application_id, "orders");
        assert_eq!(config.host_name, "pod-1");
        assert_eq!(config.instance_id.as_deref(), Some("blue"));
        assert_eq!(config.buffer_size, 20);
        assert_eq!(config.writer_type, WriterType::Async);
        assert_eq!(
            config.collector_url().unwrap().as_str(),
            "http://10.0.0.7:7000/ws/v1/timeline/metrics"
        );

        env::set_var("TIMELINE_METRICS_HOST_NAME", "metrics-host");
        let config = WriterConfig::from_env().unwrap();
        assert_eq!(config.host_name, "metrics-host");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_values() {
        clear_env();
        env::set_var("TIMELINE_METRICS_COLLECTOR_HOST", "collector");
        env::set_var("TIMELINE_METRICS_BUFFER_SIZE", "many");
        assert_eq!(
            WriterConfig::from_env(),
            Err(ConfigError::Parse(
                "TIMELINE_METRICS_BUFFER_SIZE",
                "many".to_string()
            ))
        );

        env::remove_var("TIMELINE_METRICS_BUFFER_SIZE");
        env::set_var("TIMELINE_METRICS_WRITER_TYPE", "fast");
        assert_eq!(
            WriterConfig::from_env(),
            Err(ConfigError::Parse(
                "TIMELINE_METRICS_WRITER_TYPE",
                "fast".to_string()
            ))
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_dummy_without_host() {
        clear_env();
        env::set_var("TIMELINE_METRICS_WRITER_TYPE", "dummy");
        let config = WriterConfig::from_env().unwrap();
        assert_eq!(config.writer_type, WriterType::Dummy);
        assert_eq!(config.collector_url(), None);
        clear_env();
    }
}

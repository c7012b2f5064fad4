// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use timeline_metrics::errors::ConfigError;

const DEFAULT_AGENT_HOST: &str = "0.0.0.0";
const DEFAULT_AGENT_PORT: u16 = 8189;
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 10;
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Settings of the agent process itself. Writer settings live in [`timeline_metrics::WriterConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Address the UDP listener binds to
    pub host: String,
    pub port: u16,
    /// Period of the background flush
    pub flush_interval: Duration,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_AGENT_HOST.to_string(),
            port: DEFAULT_AGENT_PORT,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            log_level: "info".to_string(),
        }
    }
}

impl AgentConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = env::var("TIMELINE_METRICS_AGENT_HOST").unwrap_or(defaults.host);
        let port = match env::var("TIMELINE_METRICS_AGENT_PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Parse("TIMELINE_METRICS_AGENT_PORT", raw))?,
            Err(_) => defaults.port,
        };
        let flush_interval = match env::var("TIMELINE_METRICS_FLUSH_INTERVAL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Parse("TIMELINE_METRICS_FLUSH_INTERVAL_SECS", raw))?,
            Err(_) => defaults.flush_interval,
        };
        let log_level = env::var("TIMELINE_METRICS_LOG_LEVEL")
            .map(|val| val.trim().to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            host,
            port,
            flush_interval,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Empty("agent host"));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Zero("flush interval"));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Parse(
                "TIMELINE_METRICS_LOG_LEVEL",
                self.log_level.clone(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "TIMELINE_METRICS_AGENT_HOST",
            "TIMELINE_METRICS_AGENT_PORT",
            "TIMELINE_METRICS_FLUSH_INTERVAL_SECS",
            "TIMELINE_METRICS_LOG_LEVEL",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_flush_interval() {
        let config = AgentConfig {
            flush_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("flush interval")));
    }

    #[test]
    fn test_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let config = AgentConfig {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Log level '{}' should be valid",
                level
            );
        }

        let config = AgentConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        assert_eq!(AgentConfig::from_env().unwrap(), AgentConfig::default());

        env::set_var("TIMELINE_METRICS_AGENT_PORT", "9999");
        env::set_var("TIMELINE_METRICS_FLUSH_INTERVAL_SECS", "3");
        env::set_var("TIMELINE_METRICS_LOG_LEVEL", "DEBUG");
        let config = AgentConfig::from_env().unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.flush_interval, Duration::from_secs(3));
        assert_eq!(config.log_level, "debug");

        env::set_var("TIMELINE_METRICS_AGENT_PORT", "http");
        assert_eq!(
            AgentConfig::from_env(),
            Err(ConfigError::Parse(
                "TIMELINE_METRICS_AGENT_PORT",
                "http".to_string()
            ))
        );
        clear_env();
    }
}

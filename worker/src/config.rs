//! Configuration management for the notification worker.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file, if present, is loaded by the binary before this runs.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Offset reset policies accepted by the Kafka client.
const OFFSET_RESET_POLICIES: [&str; 3] = ["earliest", "latest", "error"];

/// Invalid configuration detected at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `KAFKA_BOOTSTRAP_SERVERS` is empty
    #[error("KAFKA_BOOTSTRAP_SERVERS must list at least one broker")]
    MissingBrokers,

    /// `KAFKA_GROUP_ID` is empty
    #[error("KAFKA_GROUP_ID must not be empty")]
    MissingGroupId,

    /// `KAFKA_AUTO_OFFSET_RESET` is not a known policy
    #[error("KAFKA_AUTO_OFFSET_RESET must be one of earliest, latest, error (got '{0}')")]
    InvalidOffsetReset(String),

    /// `METRICS_HOST`/`METRICS_PORT` do not form a socket address
    #[error("Invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Kafka/Redpanda configuration
    pub kafka: KafkaConfig,
    /// Prometheus exporter configuration
    pub metrics: MetricsConfig,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

/// Kafka/Redpanda configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Broker addresses (comma-separated)
    pub bootstrap_servers: String,
    /// Consumer group shared by all worker instances
    pub group_id: String,
    /// Where a new consumer group starts reading (default: earliest)
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds (default: 45000)
    pub session_timeout_ms: u64,
    /// Auto commit interval in milliseconds (default: 5000)
    pub auto_commit_interval_ms: u64,
    /// How long to wait for the broker at startup, in milliseconds (default: 10000)
    pub startup_timeout_ms: u64,
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Host to bind the exporter to
    pub host: String,
    /// Port to bind the exporter to
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to their defaults; use
    /// [`validate`](Self::validate) to reject values that parse but are unusable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            kafka: KafkaConfig {
                bootstrap_servers: lookup("KAFKA_BOOTSTRAP_SERVERS")
                    .unwrap_or_else(|| "kafka:9092".to_string()),
                group_id: lookup("KAFKA_GROUP_ID")
                    .unwrap_or_else(|| "notification-worker-group".to_string()),
                auto_offset_reset: lookup("KAFKA_AUTO_OFFSET_RESET")
                    .unwrap_or_else(|| "earliest".to_string()),
                session_timeout_ms: parsed("KAFKA_SESSION_TIMEOUT_MS", 45_000),
                auto_commit_interval_ms: parsed("KAFKA_AUTO_COMMIT_INTERVAL_MS", 5_000),
                startup_timeout_ms: parsed("KAFKA_STARTUP_TIMEOUT_MS", 10_000),
            },
            metrics: MetricsConfig {
                host: lookup("METRICS_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: lookup("METRICS_PORT")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(8005),
            },
            log_level: lookup("RUST_LOG")
                .unwrap_or_else(|| "info,notification_worker=info".to_string()),
        }
    }

    /// Check the loaded values before anything connects.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brokers().is_empty() {
            return Err(ConfigError::MissingBrokers);
        }
        if self.kafka.group_id.trim().is_empty() {
            return Err(ConfigError::MissingGroupId);
        }
        if !OFFSET_RESET_POLICIES.contains(&self.kafka.auto_offset_reset.as_str()) {
            return Err(ConfigError::InvalidOffsetReset(
                self.kafka.auto_offset_reset.clone(),
            ));
        }
        self.metrics_addr()?;
        Ok(())
    }

    /// Broker list with blanks removed, joined the way librdkafka expects.
    #[must_use]
    pub fn brokers(&self) -> String {
        self.kafka
            .bootstrap_servers
            .split(',')
            .map(str::trim)
            .filter(|broker| !broker.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Address the Prometheus exporter binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMetricsAddress`] if host and port do not
    /// form a socket address.
    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.metrics.host, self.metrics.port);
        addr.parse()
            .map_err(|_| ConfigError::InvalidMetricsAddress(addr))
    }

    /// Kafka session timeout.
    #[must_use]
    pub const fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.kafka.session_timeout_ms)
    }

    /// Interval between automatic offset commits.
    #[must_use]
    pub const fn auto_commit_interval(&self) -> Duration {
        Duration::from_millis(self.kafka.auto_commit_interval_ms)
    }

    /// How long to wait for the broker during startup.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.kafka.startup_timeout_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_deployment() {
        let config = config(&[]);

        assert_eq!(config.kafka.bootstrap_servers, "kafka:9092");
        assert_eq!(config.kafka.group_id, "notification-worker-group");
        assert_eq!(config.kafka.auto_offset_reset, "earliest");
        assert_eq!(config.session_timeout(), Duration::from_secs(45));
        assert_eq!(config.auto_commit_interval(), Duration::from_secs(5));
        assert_eq!(config.startup_timeout(), Duration::from_secs(10));
        assert_eq!(config.metrics_addr().unwrap(), "0.0.0.0:8005".parse::<SocketAddr>().unwrap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = config(&[
            ("KAFKA_BOOTSTRAP_SERVERS", "broker-1:9092, broker-2:9092,"),
            ("KAFKA_GROUP_ID", "notifications-eu"),
            ("METRICS_PORT", "9105"),
            ("KAFKA_STARTUP_TIMEOUT_MS", "2500"),
        ]);

        assert_eq!(config.brokers(), "broker-1:9092,broker-2:9092");
        assert_eq!(config.kafka.group_id, "notifications-eu");
        assert_eq!(config.metrics.port, 9105);
        assert_eq!(config.startup_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = config(&[("METRICS_PORT", "not-a-port"), ("KAFKA_SESSION_TIMEOUT_MS", "-1")]);
        assert_eq!(config.metrics.port, 8005);
        assert_eq!(config.kafka.session_timeout_ms, 45_000);
    }

    #[test]
    fn validation_rejects_unusable_values() {
        assert_eq!(
            config(&[("KAFKA_BOOTSTRAP_SERVERS", " , ")]).validate(),
            Err(ConfigError::MissingBrokers)
        );
        assert_eq!(
            config(&[("KAFKA_GROUP_ID", "")]).validate(),
            Err(ConfigError::MissingGroupId)
        );
        assert_eq!(
            config(&[("KAFKA_AUTO_OFFSET_RESET", "smallest")]).validate(),
            Err(ConfigError::InvalidOffsetReset("smallest".to_string()))
        );
        assert!(matches!(
            config(&[("METRICS_HOST", "not a host")]).validate(),
            Err(ConfigError::InvalidMetricsAddress(_))
        ));
    }
}

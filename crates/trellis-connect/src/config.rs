//! Connector configuration from environment variables.

use std::time::Duration;

use crate::error::{ConnectorError, Result};

#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Records buffered between a blocking reader and the async consumer.
    pub stream_buffer: usize,
    /// Records read to infer a dataset's schema.
    pub schema_sample: usize,
    /// Timeout for each broker round-trip.
    pub kafka_timeout: Duration,
    /// Consumer group used for offset lookups and windowed reads. Offsets
    /// are never committed.
    pub kafka_group_id: String,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            stream_buffer: 1024,
            schema_sample: 1000,
            kafka_timeout: Duration::from_millis(10_000),
            kafka_group_id: default_group_id(),
        }
    }
}

fn default_group_id() -> String {
    format!("trellis-{}", uuid::Uuid::new_v4())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConnectorError::Config(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

impl ConnectConfig {
    pub fn from_env() -> Result<Self> {
        let stream_buffer: usize = parse_var("TRELLIS_STREAM_BUFFER", 1024)?;
        if stream_buffer == 0 {
            return Err(ConnectorError::Config(
                "Invalid TRELLIS_STREAM_BUFFER: must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            stream_buffer,
            schema_sample: parse_var("TRELLIS_SCHEMA_SAMPLE", 1000)?,
            kafka_timeout: Duration::from_millis(parse_var("TRELLIS_KAFKA_TIMEOUT_MS", 10_000)?),
            kafka_group_id: std::env::var("TRELLIS_KAFKA_GROUP_ID")
                .unwrap_or_else(|_| default_group_id()),
        })
    }
}

// Serializes tests that mutate TRELLIS_* variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
pub(crate) fn clear_env() {
    for key in [
        "TRELLIS_STREAM_BUFFER",
        "TRELLIS_SCHEMA_SAMPLE",
        "TRELLIS_KAFKA_TIMEOUT_MS",
        "TRELLIS_KAFKA_GROUP_ID",
    ] {
        std::env::remove_var(key);
    }
}

//! Client configuration.

use callbridge_core::{PollScheduler, DEFAULT_POLL_CEILING, DEFAULT_POLL_FLOOR, DEFAULT_SPIN_FACTOR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Backoff parameters for consumers waiting on streamed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Delay after the first empty poll, in milliseconds.
    pub floor_ms: u64,
    /// Multiplier applied after every empty poll.
    pub spin_factor: f64,
    /// Upper bound for the delay, in milliseconds.
    pub ceiling_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            floor_ms: DEFAULT_POLL_FLOOR.as_millis() as u64,
            spin_factor: DEFAULT_SPIN_FACTOR,
            ceiling_ms: DEFAULT_POLL_CEILING.as_millis() as u64,
        }
    }
}

impl PollSettings {
    /// Build a fresh scheduler from these settings.
    pub fn scheduler(&self) -> PollScheduler {
        PollScheduler::new(
            Duration::from_millis(self.floor_ms),
            self.spin_factor,
            Duration::from_millis(self.ceiling_ms),
        )
    }
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Passed verbatim (as JSON) to the native library when the execution
    /// context is created.
    pub native: serde_json::Value,

    /// Backoff for event stream consumers.
    pub poll: PollSettings,

    /// Capacity of the callback queue between foreign threads and the
    /// owning thread. Foreign producers block while it is full.
    pub callback_queue_capacity: usize,

    /// Longest single wait while awaiting a settled result, in milliseconds.
    pub await_poll_interval_ms: u64,

    /// Fixed pause after every dispatch, in milliseconds. Zero disables it.
    pub dispatch_yield_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            native: serde_json::Value::Object(Default::default()),
            poll: PollSettings::default(),
            callback_queue_capacity: 4096,
            await_poll_interval_ms: 5,
            dispatch_yield_ms: 0,
        }
    }
}

impl ClientConfig {
    /// Parse a configuration from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Set the native library configuration.
    pub fn with_native(mut self, native: serde_json::Value) -> Self {
        self.native = native;
        self
    }

    /// Set the stream backoff.
    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Set the callback queue capacity.
    pub fn with_callback_queue_capacity(mut self, capacity: usize) -> Self {
        self.callback_queue_capacity = capacity;
        self
    }

    /// Set the await poll interval.
    pub fn with_await_poll_interval(mut self, interval: Duration) -> Self {
        self.await_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the post-dispatch pause.
    pub fn with_dispatch_yield(mut self, pause: Duration) -> Self {
        self.dispatch_yield_ms = pause.as_millis() as u64;
        self
    }

    /// Longest single wait while awaiting a result.
    pub fn await_poll_interval(&self) -> Duration {
        Duration::from_millis(self.await_poll_interval_ms.max(1))
    }

    /// Fixed pause after every dispatch.
    pub fn dispatch_yield(&self) -> Duration {
        Duration::from_millis(self.dispatch_yield_ms)
    }

    /// Check the configuration for values the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.callback_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "callback_queue_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.poll.spin_factor >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "poll.spin_factor must be >= 1.0, got {}",
                self.poll.spin_factor
            )));
        }
        if self.poll.floor_ms > self.poll.ceiling_ms {
            return Err(ConfigError::Invalid(format!(
                "poll.floor_ms ({}) exceeds poll.ceiling_ms ({})",
                self.poll.floor_ms, self.poll.ceiling_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll.floor_ms, 5);
        assert_eq!(config.poll.ceiling_ms, 2500);
        assert_eq!(config.native, json!({}));
        assert_eq!(config.dispatch_yield(), Duration::ZERO);
    }

    #[test]
    fn test_parse_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            callback_queue_capacity = 64
            dispatch_yield_ms = 1

            [native.network]
            server_address = "http://localhost"

            [poll]
            floor_ms = 2
            spin_factor = 1.5
            "#,
        )
        .unwrap();

        assert_eq!(config.callback_queue_capacity, 64);
        assert_eq!(config.dispatch_yield(), Duration::from_millis(1));
        assert_eq!(config.native, json!({"network": {"server_address": "http://localhost"}}));
        assert_eq!(config.poll.floor_ms, 2);
        assert_eq!(config.poll.spin_factor, 1.5);
        // Unset fields keep their defaults.
        assert_eq!(config.poll.ceiling_ms, 2500);
        assert_eq!(config.await_poll_interval_ms, 5);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let err = ClientConfig::from_toml_str("callback_queue_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ClientConfig::from_toml_str("[poll]\nspin_factor = 0.5").unwrap_err();
        assert!(err.to_string().contains("spin_factor"));

        let err = ClientConfig::from_toml_str("[poll]\nfloor_ms = 10\nceiling_ms = 1").unwrap_err();
        assert!(err.to_string().contains("exceeds"));

        let err = ClientConfig::from_toml_str("callback_queue_capacity = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "await_poll_interval_ms = 20").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.await_poll_interval(), Duration::from_millis(20));

        let missing = ClientConfig::load("/nonexistent/callbridge.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_poll_settings_build_scheduler() {
        let settings = PollSettings {
            floor_ms: 1,
            spin_factor: 3.0,
            ceiling_ms: 5,
        };
        let mut scheduler = settings.scheduler();
        assert_eq!(scheduler.on_empty(), Duration::from_millis(1));
        assert_eq!(scheduler.on_empty(), Duration::from_millis(3));
        assert_eq!(scheduler.on_empty(), Duration::from_millis(5));
    }
}

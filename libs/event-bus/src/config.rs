use std::time::Duration;

use serde::Deserialize;

use crate::error::BusError;

/// Root configuration — parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Bootstrap broker host.
    pub host: String,

    /// Bootstrap broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// `client.id` reported to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Upper bound for dialing a partition leader.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound for the startup reachability check.
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Read deadline; an idle partition yields a timeout after this long.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Pause after a non-timeout read failure. `0` retries immediately.
    #[serde(default = "default_read_error_backoff_ms")]
    pub read_error_backoff_ms: u64,

    /// Maximum concurrent handler invocations per topic. `0` means unbounded.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default)]
    pub start_offset: StartOffset,

    #[serde(default)]
    pub read: ReadStrategy,
}

/// Where a freshly connected topic starts reading its partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    #[default]
    Beginning,
    End,
}

/// How bytes are pulled from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ReadStrategy {
    /// One message per fetch, each read bounded by `max_bytes`.
    Stream {
        #[serde(default = "default_max_bytes")]
        max_bytes: usize,
    },
    /// Windowed fetches: the broker holds a response until `min_bytes` are
    /// available or `max_wait_ms` passes, and never returns more than `max_bytes`.
    Batch {
        #[serde(default = "default_min_bytes")]
        min_bytes: usize,
        #[serde(default = "default_max_bytes")]
        max_bytes: usize,
        #[serde(default = "default_max_wait_ms")]
        max_wait_ms: u64,
    },
}

impl Default for ReadStrategy {
    fn default() -> Self {
        ReadStrategy::Batch {
            min_bytes: default_min_bytes(),
            max_bytes: default_max_bytes(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

fn default_port() -> u16 {
    9092
}
fn default_client_id() -> String {
    "gw-event-bus".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_ping_timeout_ms() -> u64 {
    5_000
}
fn default_read_timeout_ms() -> u64 {
    1_000
}
fn default_read_error_backoff_ms() -> u64 {
    100
}
fn default_max_in_flight() -> usize {
    1024
}
fn default_min_bytes() -> usize {
    10 * 1024
}
fn default_max_bytes() -> usize {
    1 << 20
}
fn default_max_wait_ms() -> u64 {
    500
}

/// librdkafka refuses `fetch.max.bytes` below its default `message.max.bytes`.
const MIN_FETCH_MAX_BYTES: usize = 1_000_000;

impl BusConfig {
    /// Config pointing at `host:port` with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: default_client_id(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            read_error_backoff_ms: default_read_error_backoff_ms(),
            max_in_flight: default_max_in_flight(),
            start_offset: StartOffset::default(),
            read: ReadStrategy::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, BusError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| BusError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| match e {
            BusError::Config(msg) => BusError::Config(format!("{path}: {msg}")),
            other => other,
        })
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, BusError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| BusError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BusError> {
        if self.host.trim().is_empty() {
            return Err(BusError::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(BusError::Config("port must not be 0".into()));
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 || self.ping_timeout_ms == 0 {
            return Err(BusError::Config("timeouts must be greater than 0".into()));
        }
        match self.read {
            ReadStrategy::Stream { max_bytes } if max_bytes < MIN_FETCH_MAX_BYTES => {
                Err(BusError::Config(format!(
                    "read.max_bytes must be at least {MIN_FETCH_MAX_BYTES}, got {max_bytes}"
                )))
            }
            ReadStrategy::Batch { min_bytes, max_bytes, .. } if min_bytes > max_bytes => {
                Err(BusError::Config(format!(
                    "read.min_bytes ({min_bytes}) exceeds read.max_bytes ({max_bytes})"
                )))
            }
            ReadStrategy::Batch { max_bytes, .. } if max_bytes < MIN_FETCH_MAX_BYTES => {
                Err(BusError::Config(format!(
                    "read.max_bytes must be at least {MIN_FETCH_MAX_BYTES}, got {max_bytes}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// `host:port` of the bootstrap broker.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn read_error_backoff(&self) -> Duration {
        Duration::from_millis(self.read_error_backoff_ms)
    }

    /// Handler concurrency bound, `None` when unbounded.
    pub fn in_flight_limit(&self) -> Option<usize> {
        (self.max_in_flight > 0).then_some(self.max_in_flight)
    }
}

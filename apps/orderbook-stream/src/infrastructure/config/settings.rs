//! Service Configuration Settings
//!
//! Configuration types for the server and client binaries, loaded from
//! environment variables. Unparseable numeric values fall back to defaults.

use std::time::Duration;

use crate::domain::streaming::InstrumentId;

// =============================================================================
// Server
// =============================================================================

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// gRPC server port.
    pub grpc_port: u16,
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            grpc_port: 50051,
            health_port: 8082,
        }
    }
}

impl ServerSettings {
    /// Whether the health server should run.
    #[must_use]
    pub const fn health_enabled(&self) -> bool {
        self.health_port != 0
    }
}

/// Per-subscription producer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSettings {
    /// Delay between incremental updates.
    pub tick_interval: Duration,
    /// Capacity of each connection's outbound channel.
    pub outbound_capacity: usize,
    /// Updates per subscription before the producer ends (None = unbounded).
    pub max_updates: Option<u64>,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            outbound_capacity: 1024,
            max_updates: None,
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Producer settings.
    pub producer: ProducerSettings,
}

impl ServerConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let server_defaults = ServerSettings::default();
        let producer_defaults = ProducerSettings::default();

        let server = ServerSettings {
            grpc_port: parse_or(&lookup, "ORDERBOOK_GRPC_PORT", server_defaults.grpc_port),
            health_port: parse_or(&lookup, "ORDERBOOK_HEALTH_PORT", server_defaults.health_port),
        };

        let tick_ms = parse_or(&lookup, "ORDERBOOK_TICK_INTERVAL_MS", 0_u64);
        let producer = ProducerSettings {
            tick_interval: if tick_ms == 0 {
                producer_defaults.tick_interval
            } else {
                Duration::from_millis(tick_ms)
            },
            outbound_capacity: parse_or(
                &lookup,
                "ORDERBOOK_OUTBOUND_CAPACITY",
                producer_defaults.outbound_capacity,
            )
            .max(1),
            max_updates: lookup("ORDERBOOK_MAX_UPDATES").and_then(|v| v.trim().parse().ok()),
        };

        Self { server, producer }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server URI.
    pub endpoint: String,
    /// Instruments to subscribe, in order.
    pub instruments: Vec<InstrumentId>,
    /// Delay between SUBSCRIBE commands.
    pub command_delay: Duration,
    /// Instrument to unsubscribe later (None = never).
    pub unsubscribe: Option<InstrumentId>,
    /// Delay after connecting before the unsubscribe.
    pub unsubscribe_after: Duration,
    /// Time after the unsubscribe before half-closing the stream.
    pub linger: Duration,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:50051".to_string(),
            instruments: vec!["AAPL".to_string(), "MSFT".to_string()],
            command_delay: Duration::from_millis(100),
            unsubscribe: Some("AAPL".to_string()),
            unsubscribe_after: Duration::from_secs(10),
            linger: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint or instrument list is empty, or the
    /// endpoint is not an http(s) URI.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let endpoint = lookup("ORDERBOOK_ENDPOINT").map_or(defaults.endpoint, |v| v.trim().to_string());
        if endpoint.is_empty() {
            return Err(ConfigError::EmptyValue("ORDERBOOK_ENDPOINT".to_string()));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidEndpoint(endpoint));
        }

        let instruments = lookup("ORDERBOOK_INSTRUMENTS")
            .map_or(defaults.instruments, |v| parse_instruments(&v));
        if instruments.is_empty() {
            return Err(ConfigError::EmptyValue("ORDERBOOK_INSTRUMENTS".to_string()));
        }

        let unsubscribe = match lookup("ORDERBOOK_UNSUBSCRIBE") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => defaults.unsubscribe,
        };

        Ok(Self {
            endpoint,
            instruments,
            command_delay: parse_duration_millis(
                &lookup,
                "ORDERBOOK_COMMAND_DELAY_MS",
                defaults.command_delay,
            ),
            unsubscribe,
            unsubscribe_after: parse_duration_secs(
                &lookup,
                "ORDERBOOK_UNSUBSCRIBE_AFTER_SECS",
                defaults.unsubscribe_after,
            ),
            linger: parse_duration_secs(&lookup, "ORDERBOOK_LINGER_SECS", defaults.linger),
            connect_timeout: parse_duration_secs(
                &lookup,
                "ORDERBOOK_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout,
            ),
        })
    }
}

/// Split a comma-separated instrument list, dropping blanks.
fn parse_instruments(raw: &str) -> Vec<InstrumentId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

// =============================================================================
// Errors and Parsing
// =============================================================================

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Endpoint is not an http(s) URI.
    #[error("invalid endpoint {0:?}: expected http:// or https:// URI")]
    InvalidEndpoint(String),
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

//! Streaming session and scenario configuration.
//!
//! [`SessionConfig`] is the per-application configuration, validated when
//! the session starts. [`ScenarioConfig`] describes the client/server demo
//! run by the `stream-sim` binary and is loaded from environment variables.

use crate::rate::DataRate;
use crate::runtime::Endpoint;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use stream_protocol::StreamFrame;
use thiserror::Error;

/// Default server emission rate.
pub const DEFAULT_DATA_RATE: DataRate = DataRate::from_kbps(500);

/// Default packet size in bytes, header included.
pub const DEFAULT_PACKET_SIZE: usize = 512;

/// Default client request interval.
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_millis(500);

/// Behavior of a streaming application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Waits for requests and streams CBR data back to the requester.
    Server,
    /// Issues periodic requests and consumes the stream.
    Client,
}

impl Role {
    /// Returns the role as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" => Ok(Role::Server),
            "client" => Ok(Role::Client),
            other => Err(ConfigError::InvalidValue(format!("unknown role {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Server role requires a non-zero local port")]
    ServerPortRequired,

    #[error("Client role requires a remote endpoint")]
    MissingPeer,

    #[error("Server data rate must be greater than zero")]
    ZeroDataRate,

    #[error("Request interval must be greater than zero")]
    ZeroRequestInterval,

    #[error("Packet size {size} is smaller than the {header}-byte stream header")]
    PacketTooSmall { size: usize, header: usize },
}

/// Per-application streaming configuration.
///
/// Defaults: 500 kb/s, 512-byte packets, 0.5 s request interval, no byte
/// budget, bound to the wildcard address on an ephemeral port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Client or server behavior.
    pub role: Role,

    /// Destination for a client. Ignored by a server, which learns its peer.
    pub remote: Option<Endpoint>,

    /// Local bind address. Port 0 means ephemeral.
    pub local: Endpoint,

    /// Rate the server emits at while streaming.
    pub data_rate: DataRate,

    /// Bytes per packet, stream header included.
    pub packet_size: usize,

    /// Client request cadence. A server pauses after twice this without a request.
    pub request_interval: Duration,

    /// Total bytes to send before stopping for good. Zero means unlimited.
    pub max_bytes: u64,
}

impl SessionConfig {
    /// Client that requests a stream from `remote`.
    #[must_use]
    pub fn client(remote: Endpoint) -> Self {
        Self {
            role: Role::Client,
            remote: Some(remote),
            ..Self::base()
        }
    }

    /// Server listening on `local`.
    #[must_use]
    pub fn server(local: Endpoint) -> Self {
        Self {
            role: Role::Server,
            remote: None,
            local,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            role: Role::Client,
            remote: None,
            local: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            data_rate: DEFAULT_DATA_RATE,
            packet_size: DEFAULT_PACKET_SIZE,
            request_interval: DEFAULT_REQUEST_INTERVAL,
            max_bytes: 0,
        }
    }

    #[must_use]
    pub fn with_local(mut self, local: Endpoint) -> Self {
        self.local = local;
        self
    }

    #[must_use]
    pub fn with_data_rate(mut self, rate: DataRate) -> Self {
        self.data_rate = rate;
        self
    }

    #[must_use]
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    #[must_use]
    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Check the configuration before the session binds.
    ///
    /// # Errors
    ///
    /// Returns the first misconfiguration found. These are programming
    /// errors in the scenario, not runtime conditions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_size < StreamFrame::HEADER_SIZE {
            return Err(ConfigError::PacketTooSmall {
                size: self.packet_size,
                header: StreamFrame::HEADER_SIZE,
            });
        }
        if self.request_interval.is_zero() {
            return Err(ConfigError::ZeroRequestInterval);
        }
        match self.role {
            Role::Server => {
                if self.local.port() == 0 {
                    return Err(ConfigError::ServerPortRequired);
                }
                if self.data_rate.is_zero() {
                    return Err(ConfigError::ZeroDataRate);
                }
            }
            Role::Client => {
                if self.remote.is_none() {
                    return Err(ConfigError::MissingPeer);
                }
            }
        }
        Ok(())
    }

    /// Bits in one packet.
    #[must_use]
    pub fn packet_bits(&self) -> u64 {
        u64::try_from(self.packet_size)
            .unwrap_or(u64::MAX)
            .saturating_mul(8)
    }
}

/// Default scenario duration.
pub const DEFAULT_DURATION_SECONDS: f64 = 10.0;

/// Default one-way link delay in milliseconds.
pub const DEFAULT_LINK_DELAY_MS: u64 = 10;

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 2000;

/// Default client port.
pub const DEFAULT_CLIENT_PORT: u16 = 1000;

/// Two-node client/server demo scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    /// Total simulated time.
    pub duration: Duration,

    /// One-way delay between the two nodes.
    pub link_delay: Duration,

    /// Server emission rate.
    pub data_rate: DataRate,

    /// Packet size for both directions.
    pub packet_size: usize,

    /// Client request cadence.
    pub client_request_interval: Duration,

    /// Interval the server's liveness window is derived from.
    pub server_request_interval: Duration,

    /// Server listening port.
    pub server_port: u16,

    /// Client local port (0 for ephemeral).
    pub client_port: u16,

    /// Server application start time.
    pub server_start: Duration,

    /// Client application start time.
    pub client_start: Duration,

    /// Server byte budget (0 = unlimited).
    pub max_bytes: u64,

    /// Throughput sampling interval.
    pub probe_interval: Duration,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Print the Prometheus metrics snapshot when the run ends.
    pub print_metrics: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs_f64(DEFAULT_DURATION_SECONDS),
            link_delay: Duration::from_millis(DEFAULT_LINK_DELAY_MS),
            data_rate: DataRate::from_kbps(100),
            packet_size: 1472,
            client_request_interval: Duration::from_millis(250),
            server_request_interval: Duration::from_millis(375),
            server_port: DEFAULT_SERVER_PORT,
            client_port: DEFAULT_CLIENT_PORT,
            server_start: Duration::from_millis(100),
            client_start: Duration::from_millis(1_900),
            max_bytes: 0,
            probe_interval: Duration::from_secs(1),
            json_logs: false,
            print_metrics: false,
        }
    }
}

impl ScenarioConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let duration = parse_seconds(vars, "STREAM_DURATION_SECONDS")?.unwrap_or(defaults.duration);
        let link_delay = parse_millis(vars, "STREAM_LINK_DELAY_MS")?.unwrap_or(defaults.link_delay);

        let data_rate = match vars.get("STREAM_DATA_RATE") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("STREAM_DATA_RATE: {e}")))?,
            None => defaults.data_rate,
        };

        let packet_size = parse_var(vars, "STREAM_PACKET_SIZE")?.unwrap_or(defaults.packet_size);
        let client_request_interval = parse_millis(vars, "STREAM_CLIENT_REQUEST_INTERVAL_MS")?
            .unwrap_or(defaults.client_request_interval);
        let server_request_interval = parse_millis(vars, "STREAM_SERVER_REQUEST_INTERVAL_MS")?
            .unwrap_or(defaults.server_request_interval);
        let server_port = parse_var(vars, "STREAM_SERVER_PORT")?.unwrap_or(defaults.server_port);
        let client_port = parse_var(vars, "STREAM_CLIENT_PORT")?.unwrap_or(defaults.client_port);
        let server_start =
            parse_seconds(vars, "STREAM_SERVER_START_SECONDS")?.unwrap_or(defaults.server_start);
        let client_start =
            parse_seconds(vars, "STREAM_CLIENT_START_SECONDS")?.unwrap_or(defaults.client_start);
        let max_bytes = parse_var(vars, "STREAM_MAX_BYTES")?.unwrap_or(defaults.max_bytes);
        let probe_interval =
            parse_millis(vars, "STREAM_PROBE_INTERVAL_MS")?.unwrap_or(defaults.probe_interval);
        let json_logs = parse_flag(vars, "STREAM_LOG_JSON").unwrap_or(defaults.json_logs);
        let print_metrics =
            parse_flag(vars, "STREAM_PRINT_METRICS").unwrap_or(defaults.print_metrics);

        if probe_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "STREAM_PROBE_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        Ok(ScenarioConfig {
            duration,
            link_delay,
            data_rate,
            packet_size,
            client_request_interval,
            server_request_interval,
            server_port,
            client_port,
            server_start,
            client_start,
            max_bytes,
            probe_interval,
            json_logs,
            print_metrics,
        })
    }

    /// Session configuration for the server node.
    #[must_use]
    pub fn server_session(&self) -> SessionConfig {
        SessionConfig::server(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            self.server_port,
        ))
        .with_data_rate(self.data_rate)
        .with_packet_size(self.packet_size)
        .with_request_interval(self.server_request_interval)
        .with_max_bytes(self.max_bytes)
    }

    /// Session configuration for the client node, requesting from `server`.
    #[must_use]
    pub fn client_session(&self, server: IpAddr) -> SessionConfig {
        SessionConfig::client(SocketAddr::new(server, self.server_port))
            .with_local(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                self.client_port,
            ))
            .with_packet_size(self.packet_size)
            .with_request_interval(self.client_request_interval)
    }
}

fn parse_var<T: FromStr>(vars: &HashMap<String, String>, key: &str) -> Result<Option<T>, ConfigError> {
    vars.get(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}")))
        })
        .transpose()
}

fn parse_flag(vars: &HashMap<String, String>, key: &str) -> Option<bool> {
    vars.get(key).map(|v| v == "true" || v == "1")
}

fn parse_millis(vars: &HashMap<String, String>, key: &str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_var::<u64>(vars, key)?.map(Duration::from_millis))
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    key: &str,
) -> Result<Option<Duration>, ConfigError> {
    match parse_var::<f64>(vars, key)? {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
        Some(_) => Err(ConfigError::InvalidValue(format!("{key} must be a non-negative number"))),
        None => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn server_addr() -> Endpoint {
        "0.0.0.0:2000".parse().unwrap()
    }

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::client("10.0.0.1:2000".parse().unwrap());

        assert_eq!(config.role, Role::Client);
        assert_eq!(config.data_rate, DEFAULT_DATA_RATE);
        assert_eq!(config.packet_size, DEFAULT_PACKET_SIZE);
        assert_eq!(config.request_interval, DEFAULT_REQUEST_INTERVAL);
        assert_eq!(config.max_bytes, 0);
        assert_eq!(config.local.port(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_requires_port() {
        let config = SessionConfig::server("0.0.0.0:0".parse().unwrap());
        assert_eq!(config.validate(), Err(ConfigError::ServerPortRequired));

        assert!(SessionConfig::server(server_addr()).validate().is_ok());
    }

    #[test]
    fn test_server_requires_rate() {
        let config = SessionConfig::server(server_addr()).with_data_rate(DataRate::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroDataRate));

        // A client never emits at the configured rate
        let client = SessionConfig::client("10.0.0.1:2000".parse().unwrap())
            .with_data_rate(DataRate::ZERO);
        assert!(client.validate().is_ok());
    }

    #[test]
    fn test_packet_must_hold_header() {
        let config = SessionConfig::server(server_addr()).with_packet_size(39);
        assert_eq!(
            config.validate(),
            Err(ConfigError::PacketTooSmall { size: 39, header: 40 })
        );
        assert!(SessionConfig::server(server_addr())
            .with_packet_size(40)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_zero_request_interval_rejected() {
        let config = SessionConfig::client("10.0.0.1:2000".parse().unwrap())
            .with_request_interval(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroRequestInterval));
    }

    #[test]
    fn test_client_requires_remote() {
        let mut config = SessionConfig::client("10.0.0.1:2000".parse().unwrap());
        config.remote = None;
        assert_eq!(config.validate(), Err(ConfigError::MissingPeer));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Server".parse::<Role>().unwrap(), Role::Server);
        assert_eq!("client".parse::<Role>().unwrap(), Role::Client);
        assert!("relay".parse::<Role>().is_err());
    }

    #[test]
    fn test_scenario_defaults() {
        let config = ScenarioConfig::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config, ScenarioConfig::default());
        assert_eq!(config.data_rate.bps(), 100_000);
        assert_eq!(config.packet_size, 1472);
        assert_eq!(config.client_request_interval, Duration::from_millis(250));
        assert_eq!(config.server_request_interval, Duration::from_millis(375));
    }

    #[test]
    fn test_scenario_custom_values() {
        let vars = HashMap::from([
            ("STREAM_DURATION_SECONDS".to_string(), "4.5".to_string()),
            ("STREAM_LINK_DELAY_MS".to_string(), "25".to_string()),
            ("STREAM_DATA_RATE".to_string(), "2Mbps".to_string()),
            ("STREAM_PACKET_SIZE".to_string(), "1000".to_string()),
            ("STREAM_MAX_BYTES".to_string(), "5000".to_string()),
            ("STREAM_SERVER_PORT".to_string(), "4000".to_string()),
            ("STREAM_LOG_JSON".to_string(), "true".to_string()),
        ]);

        let config = ScenarioConfig::from_vars(&vars).unwrap();

        assert_eq!(config.duration, Duration::from_millis(4_500));
        assert_eq!(config.link_delay, Duration::from_millis(25));
        assert_eq!(config.data_rate, DataRate::from_mbps(2));
        assert_eq!(config.packet_size, 1000);
        assert_eq!(config.max_bytes, 5000);
        assert!(config.json_logs);

        let server = config.server_session();
        assert_eq!(server.role, Role::Server);
        assert_eq!(server.local.port(), 4000);
        assert_eq!(server.max_bytes, 5000);

        let client = config.client_session("10.0.0.1".parse().unwrap());
        assert_eq!(client.remote, Some("10.0.0.1:4000".parse().unwrap()));
        assert_eq!(client.local.port(), DEFAULT_CLIENT_PORT);
    }

    #[test]
    fn test_scenario_invalid_values() {
        let vars = HashMap::from([("STREAM_PACKET_SIZE".to_string(), "big".to_string())]);
        assert!(matches!(
            ScenarioConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue(v)) if v.contains("STREAM_PACKET_SIZE")
        ));

        let vars = HashMap::from([("STREAM_DATA_RATE".to_string(), "fast".to_string())]);
        assert!(matches!(
            ScenarioConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue(v)) if v.starts_with("STREAM_DATA_RATE")
        ));

        let vars = HashMap::from([("STREAM_DURATION_SECONDS".to_string(), "-1".to_string())]);
        assert!(ScenarioConfig::from_vars(&vars).is_err());

        let vars = HashMap::from([("STREAM_PROBE_INTERVAL_MS".to_string(), "0".to_string())]);
        assert!(ScenarioConfig::from_vars(&vars).is_err());
    }
}

//! Server configuration.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fs;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Output format for report lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Text,
    Json,
}

impl Default for ReportFormat {
    fn default() -> ReportFormat {
        ReportFormat::Text
    }
}

/// Runtime settings, loadable from a TOML file.
///
/// Every field has a default, so an empty file (or no file at all) is a
/// valid configuration. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the UDP socket binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// UDP port to listen on. Port 0 binds an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Milliseconds between reports.
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    /// Samples kept per distribution bucket for quantile estimation.
    #[serde(default = "default_reservoir_size")]
    pub reservoir_size: usize,
    /// Receive buffer size. The OS truncates larger datagrams.
    #[serde(default = "default_recv_buffer_bytes")]
    pub recv_buffer_bytes: usize,
    /// Report line format.
    #[serde(default)]
    pub report_format: ReportFormat,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7111
}

fn default_report_interval_ms() -> u64 {
    10_000
}

fn default_reservoir_size() -> usize {
    crate::aggregate::DEFAULT_RESERVOIR_SIZE
}

fn default_recv_buffer_bytes() -> usize {
    8192
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            bind_address: default_bind_address(),
            port: default_port(),
            report_interval_ms: default_report_interval_ms(),
            reservoir_size: default_reservoir_size(),
            recv_buffer_bytes: default_recv_buffer_bytes(),
            report_format: ReportFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Loads settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// The socket address to bind, resolved from `bind_address` and `port`.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.bind_address.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn with_bind_address<S: Into<String>>(mut self, address: S) -> ServerConfig {
        self.bind_address = address.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> ServerConfig {
        self.port = port;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> ServerConfig {
        self.report_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_reservoir_size(mut self, size: usize) -> ServerConfig {
        self.reservoir_size = size;
        self
    }

    pub fn with_recv_buffer_bytes(mut self, bytes: usize) -> ServerConfig {
        self.recv_buffer_bytes = bytes;
        self
    }

    pub fn with_report_format(mut self, format: ReportFormat) -> ServerConfig {
        self.report_format = format;
        self
    }
}

/// Errors raised while loading or resolving configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Address(AddrParseError),
    ZeroInterval,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "invalid config file: {}", e),
            ConfigError::Address(e) => write!(f, "invalid bind address: {}", e),
            ConfigError::ZeroInterval => write!(f, "report interval must be greater than zero"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Address(e) => Some(e),
            ConfigError::ZeroInterval => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> ConfigError {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> ConfigError {
        ConfigError::Parse(e)
    }
}

impl From<AddrParseError> for ConfigError {
    fn from(e: AddrParseError) -> ConfigError {
        ConfigError::Address(e)
    }
}

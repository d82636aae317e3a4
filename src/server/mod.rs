//! Service plumbing: the UDP listener, the periodic reporter, and the
//! lifecycle state they share.

mod lifecycle;
mod listener;
mod reporter;
mod sink;

pub use lifecycle::{ServiceState, Stage};
pub use listener::{ListenerStats, UdpServer};
pub use reporter::{format_report, Reporter};
pub use sink::{ConsoleSink, MemorySink, ReportSink};

use crate::config::ConfigError;
use std::error::Error;
use std::fmt;

/// Errors that prevent the listener or reporter from coming up.
#[derive(Debug)]
pub enum ServerError {
    /// The configured bind address could not be resolved.
    Config(ConfigError),
    /// The UDP socket could not be bound.
    Bind(std::io::Error),
    /// `start` was called on a service that is not freshly created.
    AlreadyStarted(Stage),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Config(e) => write!(f, "invalid listen configuration: {}", e),
            ServerError::Bind(e) => write!(f, "failed to bind UDP socket: {}", e),
            ServerError::AlreadyStarted(stage) => {
                write!(f, "service already started (stage {:?})", stage)
            }
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServerError::Config(e) => Some(e),
            ServerError::Bind(e) => Some(e),
            ServerError::AlreadyStarted(_) => None,
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(e: ConfigError) -> ServerError {
        ServerError::Config(e)
    }
}

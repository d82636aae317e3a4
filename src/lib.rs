pub mod aggregate;
pub mod backend;
pub mod config;
pub mod proto;
pub mod server;

pub use aggregate::{BucketSnapshot, Registry, Summary};
pub use backend::{Backend, ConsoleBackend, RecordingBackend, RegistryBackend, SharedBackend};
pub use config::{ReportFormat, ServerConfig};
pub use proto::{parse_line, parse_payload, Event, MetricKind, ParseError};
pub use server::{Reporter, ServerError, Stage, UdpServer};

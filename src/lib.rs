pub mod config;
pub mod error;
pub mod forwarder;
pub mod frame;
pub mod manager;
pub mod source;
pub mod stats;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::ForwarderConfig;
pub use error::{ConfigError, ConnectError, TransportError};
pub use forwarder::{Forwarder, ForwarderOptions, ForwarderState};
pub use frame::Frame;
pub use manager::ForwarderManager;
pub use source::{MessageSource, SourceConnector, UdpConnector};
pub use stats::StatsSnapshot;

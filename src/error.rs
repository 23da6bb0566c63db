use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Failure to bind or connect an endpoint at forwarder startup.
///
/// Fatal for the one forwarder it belongs to; the manager logs it and keeps
/// starting the rest.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to bind inbound endpoint {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to open outbound socket: {0}")]
    Outbound(#[source] io::Error),
}

/// Send/receive failure other than a routine timeout.
///
/// Caught at the loop level, logged, followed by a short pause; never fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
}

/// Invalid static configuration, detected before anything starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("duplicate source port {0} in vehicle configuration")]
    DuplicateSourcePort(u16),
    #[error("invalid vehicle spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },
    #[error("no vehicles configured")]
    Empty,
}

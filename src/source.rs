//! Inbound message source boundary.
//!
//! The forwarder core only needs "give me the next decodable frame within a
//! timeout"; everything about sockets and wire decoding lives behind these
//! two traits so the relay loop can be driven by a scripted source in tests.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::error::{ConnectError, TransportError};
use crate::frame::Frame;

/// Blocking-with-timeout frame receiver.
///
/// `receive` returns `Ok(None)` on a routine timeout. Malformed wire data is
/// discarded internally and never surfaces as a frame or an error.
pub trait MessageSource: Send {
    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError>;
}

/// Binds an inbound endpoint and hands back a live [`MessageSource`].
pub trait SourceConnector: Send + Sync {
    fn connect(&self, endpoint: SocketAddr) -> Result<Box<dyn MessageSource>, ConnectError>;
}

/// Production connector: one bound UDP socket per forwarder.
pub struct UdpConnector;

impl SourceConnector for UdpConnector {
    fn connect(&self, endpoint: SocketAddr) -> Result<Box<dyn MessageSource>, ConnectError> {
        let socket = UdpSocket::bind(endpoint).map_err(|source| ConnectError::Bind {
            addr: endpoint,
            source,
        })?;

        // A burst of full-rate telemetry from several vehicles can overrun
        // the default receive buffer, so ask for a bigger one. Not fatal if
        // the OS refuses.
        let raw = Socket::from(socket);
        if let Err(e) = raw.set_recv_buffer_size(1024 * 1024) {
            warn!("Failed to set receive buffer for {}: {}", endpoint, e);
        }
        let socket = UdpSocket::from(raw);

        info!("Listening on UDP {}", endpoint);
        Ok(Box::new(UdpMessageSource {
            socket,
            buffer: vec![0u8; 65536],
        }))
    }
}

/// [`MessageSource`] over a bound UDP socket with per-call read timeouts.
pub struct UdpMessageSource {
    socket: UdpSocket,
    buffer: Vec<u8>,
}

impl MessageSource for UdpMessageSource {
    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket
                .set_read_timeout(Some(remaining))
                .map_err(TransportError::Recv)?;

            match self.socket.recv_from(&mut self.buffer) {
                Ok((size, src)) => match Frame::parse(&self.buffer[..size]) {
                    Some(frame) => return Ok(Some(frame)),
                    None => {
                        // Not a decodable frame; drop it and keep waiting
                        // out the remainder of the timeout.
                        debug!("Discarding {} undecodable bytes from {}", size, src);
                    }
                },
                Err(e) => match e.kind() {
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                        return Ok(None);
                    }
                    _ => return Err(TransportError::Recv(e)),
                },
            }
        }
    }
}

/// Open an unconnected UDP socket for relaying frames toward `destination`,
/// with an enlarged send buffer. The socket family follows the destination
/// address so IPv6 interfaces work the same as IPv4.
pub fn open_outbound_socket(destination: SocketAddr) -> Result<UdpSocket, ConnectError> {
    let socket = Socket::new(
        Domain::for_address(destination),
        Type::DGRAM,
        Some(Protocol::UDP),
    )
    .map_err(ConnectError::Outbound)?;
    if let Err(e) = socket.set_send_buffer_size(1024 * 1024) {
        warn!("Failed to set send buffer: {}", e);
    }
    let bind: SocketAddr = if destination.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    socket
        .bind(&bind.into())
        .map_err(ConnectError::Outbound)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::v2_frame;

    #[test]
    fn udp_source_receives_and_times_out() {
        let connector = UdpConnector;
        let mut source = connector
            .connect("127.0.0.1:0".parse().unwrap())
            .expect("bind ephemeral port");

        // Nothing sent yet: a short timeout comes back empty, not an error.
        let got = source.receive(Duration::from_millis(20)).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn udp_source_skips_undecodable_datagrams() {
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = UdpSocket::bind(bind).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut source = Box::new(UdpMessageSource {
            socket: listener,
            buffer: vec![0u8; 65536],
        });

        let sender = UdpSocket::bind(bind).unwrap();
        sender.send_to(&[0xAA, 0xBB, 0xCC], addr).unwrap();
        let frame = v2_frame(5, 0);
        sender.send_to(&frame, addr).unwrap();

        let got = source
            .receive(Duration::from_secs(2))
            .unwrap()
            .expect("decodable frame after garbage");
        assert_eq!(got.system_id, 5);
        assert_eq!(got.bytes, frame);
    }

    #[test]
    fn outbound_socket_follows_destination_family() {
        for bind in ["127.0.0.1:0", "[::1]:0"] {
            let listener = UdpSocket::bind(bind).unwrap();
            listener
                .set_read_timeout(Some(Duration::from_secs(2)))
                .unwrap();
            let dest = listener.local_addr().unwrap();

            let socket = open_outbound_socket(dest).unwrap();
            socket.send_to(b"ping", dest).unwrap();

            let mut buf = [0u8; 16];
            let (n, _) = listener.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"ping");
        }
    }

    #[test]
    fn duplicate_bind_fails_with_connect_error() {
        let connector = UdpConnector;
        let first = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = first.local_addr().unwrap();

        let err = connector.connect(addr).err().unwrap();
        assert!(matches!(err, ConnectError::Bind { .. }));
    }
}

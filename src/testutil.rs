//! Shared fixtures for the unit tests: synthetic MAVLink frames and a
//! scripted message source so the relay loop can be exercised without a
//! live simulator.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{ConnectError, TransportError};
use crate::forwarder::ForwarderOptions;
use crate::frame::Frame;
use crate::source::{MessageSource, SourceConnector};

/// Minimal MAVLink v2 frame: real header, `marker` embedded in the payload
/// so every frame has distinct bytes, checksum left zeroed (the forwarder
/// never validates it).
pub(crate) fn v2_frame(system_id: u8, marker: u32) -> Vec<u8> {
    let payload = marker.to_le_bytes();
    let mut buf = vec![
        0xFD,
        payload.len() as u8,
        0,
        0,
        (marker & 0xFF) as u8,
        system_id,
        1,
        (marker & 0xFF) as u8,
        0,
        0,
    ];
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&[0, 0]);
    buf
}

/// Minimal MAVLink v1 frame.
pub(crate) fn v1_frame(system_id: u8, message_id: u8) -> Vec<u8> {
    vec![0xFE, 4, 0, system_id, 1, message_id, 0, 0, 0, 0, 0, 0]
}

/// Options shrunk so the loop scenarios run in milliseconds.
pub(crate) fn fast_options() -> ForwarderOptions {
    ForwarderOptions {
        receive_timeout: Duration::from_millis(50),
        stop_grace: Duration::from_millis(300),
        stats_interval: Duration::from_secs(3600),
        silence_threshold: 10,
        error_backoff: Duration::from_millis(5),
    }
}

pub(crate) enum ScriptItem {
    Frame(Frame),
    Timeout,
}

/// Scripted [`MessageSource`]: scripted timeouts return immediately, an
/// exhausted script behaves like a quiet wire (block for the full timeout,
/// then report nothing).
pub(crate) struct FakeSource {
    script: VecDeque<ScriptItem>,
}

impl MessageSource for FakeSource {
    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        match self.script.pop_front() {
            Some(ScriptItem::Frame(frame)) => Ok(Some(frame)),
            Some(ScriptItem::Timeout) => Ok(None),
            None => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

/// Connector handing out scripted sources keyed by port, with optional
/// ports that refuse to bind.
pub(crate) struct FakeConnector {
    scripts: Mutex<HashMap<u16, VecDeque<ScriptItem>>>,
    refused: Mutex<Vec<u16>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            refused: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn script_port(&self, port: u16, script: VecDeque<ScriptItem>) {
        self.scripts.lock().insert(port, script);
    }

    pub(crate) fn refuse_port(&self, port: u16) {
        self.refused.lock().push(port);
    }
}

impl SourceConnector for FakeConnector {
    fn connect(&self, endpoint: SocketAddr) -> Result<Box<dyn MessageSource>, ConnectError> {
        if self.refused.lock().contains(&endpoint.port()) {
            return Err(ConnectError::Bind {
                addr: endpoint,
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            });
        }
        let script = self
            .scripts
            .lock()
            .remove(&endpoint.port())
            .unwrap_or_default();
        Ok(Box::new(FakeSource { script }))
    }
}

//! Per-vehicle filter-and-relay loop.
//!
//! Each forwarder owns one bound inbound source, one outbound UDP socket and
//! its own counters, and runs on its own OS thread. Shutdown is cooperative:
//! `stop()` flips the state cell and the loop notices at the next iteration
//! boundary, so worst-case stop latency is one receive timeout plus the
//! grace period.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::ForwarderConfig;
use crate::error::{ConnectError, TransportError};
use crate::source::{MessageSource, SourceConnector, open_outbound_socket};
use crate::stats::{ForwarderStats, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ForwarderState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(ForwarderState::Idle as u8))
    }

    pub(crate) fn load(&self) -> ForwarderState {
        match self.0.load(Ordering::Relaxed) {
            0 => ForwarderState::Idle,
            1 => ForwarderState::Running,
            2 => ForwarderState::Stopping,
            _ => ForwarderState::Stopped,
        }
    }

    fn store(&self, state: ForwarderState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }
}

/// Timing knobs for the relay loop. The defaults match the deployed
/// behavior; tests shrink them so the scenarios run in milliseconds.
#[derive(Debug, Clone)]
pub struct ForwarderOptions {
    /// Upper bound on one blocking receive.
    pub receive_timeout: Duration,
    /// How long `stop()` waits for the loop after the in-flight receive
    /// would have timed out, before abandoning it.
    pub stop_grace: Duration,
    /// Minimum wall-clock spacing between periodic stats lines.
    pub stats_interval: Duration,
    /// Consecutive empty receives before a silence warning is emitted.
    pub silence_threshold: u32,
    /// Pause after a transport error before the next loop pass.
    pub error_backoff: Duration,
}

impl Default for ForwarderOptions {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(1),
            stop_grace: Duration::from_secs(2),
            stats_interval: Duration::from_secs(10),
            silence_threshold: 10,
            error_backoff: Duration::from_millis(100),
        }
    }
}

/// Relays frames from one inbound endpoint to one outbound endpoint,
/// forwarding only frames whose source system id matches the configured
/// vehicle.
pub struct Forwarder {
    config: ForwarderConfig,
    bind_ip: IpAddr,
    options: ForwarderOptions,
    connector: Arc<dyn SourceConnector>,
    stats: Arc<ForwarderStats>,
    state: Arc<StateCell>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Forwarder {
    pub fn new(
        config: ForwarderConfig,
        bind_ip: IpAddr,
        connector: Arc<dyn SourceConnector>,
        options: ForwarderOptions,
    ) -> Self {
        Self {
            config,
            bind_ip,
            options,
            connector,
            stats: Arc::new(ForwarderStats::default()),
            state: Arc::new(StateCell::new()),
            handle: None,
        }
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn state(&self) -> ForwarderState {
        self.state.load()
    }

    /// Bind the endpoints and launch the relay loop. Calling this while the
    /// forwarder is already running is a no-op; a stopped forwarder cannot
    /// be restarted, recreate it instead.
    pub fn start(&mut self) -> Result<(), ConnectError> {
        match self.state.load() {
            ForwarderState::Idle => {}
            ForwarderState::Running | ForwarderState::Stopping => return Ok(()),
            ForwarderState::Stopped => {
                warn!(
                    "Vehicle {}: start() on a stopped forwarder ignored",
                    self.config.vehicle_id
                );
                return Ok(());
            }
        }

        let source_addr = SocketAddr::new(self.bind_ip, self.config.source_port);
        let source = self.connector.connect(source_addr)?;
        let destination = SocketAddr::new(self.bind_ip, self.config.destination_port);
        let outbound = open_outbound_socket(destination)?;

        self.stats.mark_started();
        self.state.store(ForwarderState::Running);

        let config = self.config.clone();
        let options = self.options.clone();
        let stats = self.stats.clone();
        let state = self.state.clone();
        self.handle = Some(thread::spawn(move || {
            relay_loop(source, outbound, destination, config, options, stats, state);
        }));

        info!(
            "Vehicle {}: forwarder started ({} -> {}, filtering sysid={})",
            self.config.vehicle_id, source_addr, destination, self.config.expected_system_id
        );
        Ok(())
    }

    /// Request the loop to exit and wait up to the receive timeout plus the
    /// grace period. If the loop has still not come back it is abandoned;
    /// the only resource at risk is its bound socket, which the OS reclaims
    /// when the thread eventually exits.
    pub fn stop(&mut self) {
        match self.state.load() {
            ForwarderState::Idle | ForwarderState::Stopped => return,
            ForwarderState::Running | ForwarderState::Stopping => {}
        }
        self.state.store(ForwarderState::Stopping);

        let deadline = Instant::now() + self.options.receive_timeout + self.options.stop_grace;
        if let Some(handle) = self.handle.take() {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!(
                        "Vehicle {}: relay loop panicked",
                        self.config.vehicle_id
                    );
                }
                info!("Vehicle {}: forwarder stopped", self.config.vehicle_id);
            } else {
                warn!(
                    "Vehicle {}: relay loop did not exit within grace period, abandoning",
                    self.config.vehicle_id
                );
            }
        }
        self.state.store(ForwarderState::Stopped);
    }

    /// Non-blocking read of the current counters and derived metrics. Safe
    /// to call concurrently with the running loop.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(
            self.config.vehicle_id,
            self.config.expected_system_id,
            self.state.load(),
        )
    }
}

fn relay_loop(
    mut source: Box<dyn MessageSource>,
    outbound: UdpSocket,
    destination: SocketAddr,
    config: ForwarderConfig,
    options: ForwarderOptions,
    stats: Arc<ForwarderStats>,
    state: Arc<StateCell>,
) {
    let mut consecutive_timeouts = 0u32;
    let mut last_report = Instant::now();

    while state.load() == ForwarderState::Running {
        match source.receive(options.receive_timeout) {
            Ok(None) => {
                consecutive_timeouts += 1;
                if consecutive_timeouts >= options.silence_threshold {
                    warn!(
                        "Vehicle {}: no data for {} consecutive receive timeouts",
                        config.vehicle_id, consecutive_timeouts
                    );
                    stats.record_silence_warning();
                    consecutive_timeouts = 0;
                }
            }
            Ok(Some(frame)) => {
                consecutive_timeouts = 0;
                stats.note_system_id(frame.system_id);

                if frame.system_id == config.expected_system_id {
                    match outbound.send_to(frame.raw_bytes(), destination) {
                        Ok(_) => stats.record_forwarded(frame.len()),
                        Err(e) => {
                            let e = TransportError::Send(e);
                            error!(
                                "Vehicle {}: relay to {} failed: {}",
                                config.vehicle_id, destination, e
                            );
                            stats.record_send_error();
                            thread::sleep(options.error_backoff);
                        }
                    }
                } else {
                    stats.record_filtered();
                }
            }
            Err(e) => {
                error!("Vehicle {}: {}", config.vehicle_id, e);
                thread::sleep(options.error_backoff);
            }
        }

        if last_report.elapsed() >= options.stats_interval {
            info!(
                "{}",
                stats
                    .snapshot(config.vehicle_id, config.expected_system_id, state.load())
                    .log_line()
            );
            last_report = Instant::now();
        }
    }

    state.store(ForwarderState::Stopped);
    debug!("Vehicle {}: relay loop exited", config.vehicle_id);
}

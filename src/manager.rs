//! Fleet-level control: builds one forwarder per configured vehicle,
//! staggers their startup, coordinates shutdown and aggregates reporting.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::config::{self, ForwarderConfig};
use crate::error::ConfigError;
use crate::forwarder::{Forwarder, ForwarderOptions};
use crate::source::SourceConnector;
use crate::stats::StatsSnapshot;

pub struct ForwarderManager {
    forwarders: Vec<Forwarder>,
    stagger: Duration,
}

impl ForwarderManager {
    /// Build one forwarder per config, in order. Fails fast if two configs
    /// claim the same inbound port.
    pub fn new(
        configs: Vec<ForwarderConfig>,
        bind_ip: IpAddr,
        connector: Arc<dyn SourceConnector>,
        options: ForwarderOptions,
        stagger: Duration,
    ) -> Result<Self, ConfigError> {
        config::validate(&configs)?;

        let forwarders = configs
            .into_iter()
            .map(|cfg| Forwarder::new(cfg, bind_ip, connector.clone(), options.clone()))
            .collect();

        Ok(Self {
            forwarders,
            stagger,
        })
    }

    /// Start every forwarder in configuration order with a fixed delay
    /// between starts, so N connection attempts never burst at once. A
    /// forwarder that fails to bind is logged and skipped; the rest still
    /// start.
    pub fn start_all(&mut self) {
        info!("Starting {} telemetry forwarders...", self.forwarders.len());
        let count = self.forwarders.len();
        let mut started = 0;

        for (i, forwarder) in self.forwarders.iter_mut().enumerate() {
            match forwarder.start() {
                Ok(()) => started += 1,
                Err(e) => {
                    error!(
                        "Vehicle {}: failed to start forwarder: {}",
                        forwarder.config().vehicle_id,
                        e
                    );
                }
            }
            if i + 1 < count {
                thread::sleep(self.stagger);
            }
        }

        info!("Started {}/{} forwarders", started, count);
    }

    /// Best-effort stop of every forwarder in turn.
    pub fn stop_all(&mut self) {
        info!("Stopping all forwarders...");
        for forwarder in &mut self.forwarders {
            forwarder.stop();
        }
        info!("All forwarders stopped");
    }

    /// Snapshot every forwarder. Callable at any time, including while the
    /// loops are running.
    pub fn report(&self) -> Vec<StatsSnapshot> {
        self.forwarders.iter().map(Forwarder::snapshot).collect()
    }

    /// Human-readable aggregate report.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(80));
        let _ = writeln!(out, "  Telemetry Forwarder Statistics (System ID Filtering)");
        let _ = writeln!(out, "{}", "=".repeat(80));

        for snap in self.report() {
            let _ = writeln!(
                out,
                "\nVehicle {} (Expected SysID: {}, {:?}):",
                snap.vehicle_id, snap.expected_system_id, snap.state
            );
            let _ = writeln!(out, "  Received:       {} packets", snap.packets_received);
            let _ = writeln!(
                out,
                "  Forwarded:      {} packets @ {:.1} Hz",
                snap.packets_forwarded,
                snap.forward_rate_hz()
            );
            let _ = writeln!(
                out,
                "  Filtered:       {} packets ({:.1}%)",
                snap.packets_filtered,
                snap.filter_percentage()
            );
            let _ = writeln!(
                out,
                "  Data forwarded: {:.1} KB",
                snap.bytes_forwarded as f64 / 1024.0
            );
            let _ = writeln!(out, "  Bandwidth:      {:.1} kbps", snap.bandwidth_kbps());
            if snap.send_errors > 0 {
                let _ = writeln!(out, "  Send errors:    {}", snap.send_errors);
            }
            let _ = writeln!(out, "  SysIDs seen:    {:?}", snap.system_ids_seen);
        }

        let _ = writeln!(out, "{}", "=".repeat(80));
        out
    }
}

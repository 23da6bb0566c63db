use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tracing::info;

use telemetry_forwarder::config::parse_vehicle_specs;
use telemetry_forwarder::forwarder::ForwarderOptions;
use telemetry_forwarder::manager::ForwarderManager;
use telemetry_forwarder::source::UdpConnector;

#[derive(Parser, Debug)]
#[command(name = "telemetry-forwarder")]
#[command(about = "Relays MAVLink telemetry to per-vehicle ports, filtered by source system id")]
struct Args {
    /// Vehicle assignments as vehicle:src_port:dst_port:sysid, comma-separated
    #[arg(
        short = 'V',
        long,
        default_value = "1:14540:14550:1,2:14541:14551:2,3:14542:14552:3"
    )]
    vehicles: String,

    /// Interface IP to bind and relay on
    #[arg(short = 'i', long, default_value = "127.0.0.1")]
    interface: String,

    /// Report interval in seconds
    #[arg(short = 'r', long, default_value = "10")]
    interval: u64,

    /// Time to run in seconds (0 = until Ctrl+C)
    #[arg(short, long, default_value = "0")]
    time: u64,

    /// Delay between forwarder starts in milliseconds
    #[arg(long, default_value = "1000")]
    stagger_ms: u64,

    /// Verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let bind_ip: IpAddr = args
        .interface
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid IP address: {}", e))?;
    let configs = parse_vehicle_specs(&args.vehicles)?;

    info!("Starting telemetry forwarder on interface {}", bind_ip);
    for cfg in &configs {
        info!(
            "  Vehicle {} (SysID {}): port {} -> port {}",
            cfg.vehicle_id, cfg.expected_system_id, cfg.source_port, cfg.destination_port
        );
    }

    let mut manager = ForwarderManager::new(
        configs,
        bind_ip,
        Arc::new(UdpConnector),
        ForwarderOptions::default(),
        Duration::from_millis(args.stagger_ms),
    )?;
    manager.start_all();

    // Graceful shutdown on Ctrl+C.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    let start_time = Instant::now();
    let run_duration = if args.time > 0 {
        Some(Duration::from_secs(args.time))
    } else {
        None
    };

    let mut interval = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    interval.tick().await; // first tick completes immediately
    while running.load(Ordering::Relaxed) {
        tokio::select! {
            _ = interval.tick() => {
                print!("{}", manager.render_report());
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }

        if let Some(limit) = run_duration {
            if start_time.elapsed() >= limit {
                info!("Run duration ({} seconds) completed", args.time);
                break;
            }
        }
    }

    manager.stop_all();
    print!("{}", manager.render_report());
    info!("Telemetry forwarder shutdown complete");

    Ok(())
}

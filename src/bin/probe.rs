use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use fieldnms::alarm::LogTone;
use fieldnms::api::{self, ConsoleState};
use fieldnms::config::ProbeConfig;
use fieldnms::engine::{LogDisplay, Monitor, ProbeRuntime};
use fieldnms::health::IcmpProber;
use fieldnms::models::Snapshot;
use fieldnms::net::{self, RouteCheck};
use fieldnms::registry::TargetRegistry;
use fieldnms::utils;

#[derive(Parser)]
#[command(name = "fieldnms-probe", about = "Field network-health probe")]
struct Args {
    /// Config file; without it /etc/fieldnms/targets.json and
    /// ./targets.json are tried, then built-in targets apply.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::enable_ansi();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_ansi(true)
        .init();

    let args = Args::parse();
    let config = ProbeConfig::load(args.config.as_deref())?;

    let mut registry = TargetRegistry::new();
    for spec in &config.targets {
        if let Err(e) = registry.add(&spec.name, &spec.host, spec.interval_ms) {
            warn!(name = %spec.name, "skipping configured target: {e}");
        }
    }

    let telemetry_dest = net::resolve_dest(&config.telemetry_dest).await?;

    let prober = IcmpProber::new()?;
    let monitor = Monitor::new(registry, prober, LogTone, RouteCheck::toward(telemetry_dest));

    let cmd_socket = net::bind_udp(config.command_port).await?;
    let telemetry_socket = net::bind_sender().await?;

    let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot { ts: 0, items: vec![] });
    let ack = Arc::new(AtomicBool::new(false));

    if config.http_port != 0 {
        let state = ConsoleState {
            snapshot: snapshot_rx,
            ack: ack.clone(),
            command_addr: ([127, 0, 0, 1], config.command_port).into(),
        };
        let port = config.http_port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state).await {
                error!("console server failed: {e}");
            }
        });
    }

    let runtime = ProbeRuntime {
        monitor,
        display: LogDisplay,
        cmd_socket,
        telemetry_socket,
        broadcast_dest: net::broadcast_for(telemetry_dest),
        telemetry_dest,
        telemetry_interval_ms: config.telemetry_interval_ms,
        snapshot_tx,
        ack,
    };
    tokio::spawn(runtime.run());

    signal::ctrl_c().await?;
    info!("shutdown signal received, closing probe");
    Ok(())
}

//! # alertline
//!
//! `alertline serve` runs the broadcaster; `alertline watch` runs a viewer
//! that logs each alert and a running stats line.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use alertline_client::{
    spawn_demo_feed, AlertStore, ConnectionManager, ConnectionState, Dashboard, FilterKind,
    ReconnectPolicy, WsConnector,
};
use alertline_core::{Alert, SyntheticSource};
use alertline_settings::AlertlineSettings;
use alertline_telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Real-time alert broadcaster and viewer.
#[derive(Parser, Debug)]
#[command(name = "alertline", about = "Real-time alert broadcaster and viewer")]
struct Cli {
    /// Settings file (defaults to `~/.alertline/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Broadcast synthetic alerts to every connected viewer.
    Serve(ServeArgs),
    /// Connect to a broadcaster and log incoming alerts.
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Milliseconds between generated alerts.
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Broadcaster endpoint, e.g. `ws://localhost:5566/alerts`.
    #[arg(long)]
    url: Option<String>,

    /// Also generate local demo alerts.
    #[arg(long)]
    demo: bool,

    /// Only log alerts matching this dimension (`severity`, `hostname`, `message`, `date`).
    #[arg(long, value_parser = clap::value_parser!(FilterKind))]
    filter_kind: Option<FilterKind>,

    /// Value for `--filter-kind`.
    #[arg(long, requires = "filter_kind")]
    filter: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<AlertlineSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(alertline_settings::settings_path);
        alertline_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }
}

fn init_logging(settings: &AlertlineSettings) -> TelemetryGuard {
    init_telemetry(TelemetryConfig::from_directive(
        &settings.logging.level,
        settings.logging.json,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = cli.load_settings()?;

    match cli.command {
        Command::Serve(args) => {
            if let Some(host) = args.host {
                settings.server.host = host;
            }
            if let Some(port) = args.port {
                settings.server.port = port;
            }
            if let Some(ms) = args.interval_ms {
                settings.server.broadcast_interval_ms = ms;
            }
            settings.validate().context("Invalid server options")?;
            let telemetry = init_logging(&settings);
            serve(settings, telemetry).await
        }
        Command::Watch(args) => {
            if let Some(url) = args.url.clone() {
                settings.client.url = url;
            }
            if args.demo {
                settings.client.demo_enabled = true;
            }
            settings.validate().context("Invalid viewer options")?;
            let telemetry = init_logging(&settings);
            watch(settings, args, telemetry).await
        }
    }
}

async fn serve(settings: AlertlineSettings, telemetry: TelemetryGuard) -> Result<()> {
    let source = Arc::new(SyntheticSource::with_interval(
        settings.server.broadcast_interval(),
    ));
    let config = alertline_server::ServerConfig::from(&settings.server);
    let handle = alertline_server::start(config, source, telemetry.metrics())
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                settings.server.host, settings.server.port
            )
        })?;

    tracing::info!(
        port = handle.port,
        path = %settings.server.path,
        interval_ms = settings.server.broadcast_interval_ms,
        "alertline broadcaster ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

async fn watch(
    settings: AlertlineSettings,
    args: WatchArgs,
    telemetry: TelemetryGuard,
) -> Result<()> {
    let client = &settings.client;
    let (alert_tx, mut alert_rx) = mpsc::channel::<Alert>(256);

    let manager = ConnectionManager::new(
        client.url.clone(),
        Arc::new(WsConnector),
        ReconnectPolicy::from(client),
        alert_tx.clone(),
    )
    .with_metrics(telemetry.metrics());

    let demo = SyntheticSource::with_interval(client.demo_interval());
    let mut dashboard = Dashboard::new(AlertStore::new(client.store_capacity), demo.clone())
        .with_connection(manager.subscribe());
    if let Some(kind) = args.filter_kind {
        dashboard.set_filter_kind(kind);
        dashboard.set_filter_value(args.filter.unwrap_or_default());
    }

    let cancel = CancellationToken::new();
    let demo_task = client
        .demo_enabled
        .then(|| spawn_demo_feed(Arc::new(demo), alert_tx, cancel.clone()));

    let mut states = manager.subscribe();
    manager.start();
    tracing::info!(url = %client.url, demo = client.demo_enabled, "alertline viewer started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                match state {
                    ConnectionState::Connected => tracing::info!("live"),
                    ConnectionState::Connecting => tracing::debug!("connecting"),
                    ConnectionState::Disconnected { attempt } => {
                        tracing::info!(attempt, "disconnected");
                    }
                }
            }
            alert = alert_rx.recv() => {
                let Some(alert) = alert else { break };
                let shown = dashboard.filter().matches(&alert);
                if shown {
                    tracing::info!(
                        alert_id = %alert.id,
                        severity = %alert.severity,
                        hostname = %alert.hostname,
                        message = %alert.message,
                        "alert"
                    );
                }
                dashboard.ingest(alert);
                log_stats(&dashboard);
            }
        }
    }

    tracing::info!("shutting down");
    cancel.cancel();
    manager.close().await;
    if let Some(task) = demo_task {
        let _ = task.await;
    }
    log_stats(&dashboard);
    Ok(())
}

fn log_stats(dashboard: &Dashboard) {
    let c = dashboard.counts();
    tracing::info!(
        connected = dashboard.is_connected(),
        total = c.total,
        critical = c.critical,
        warning = c.warning,
        info = c.info,
        success = c.success,
        active_hosts = c.active_hosts,
        visible = dashboard.alerts().count(),
        "stats"
    );
}

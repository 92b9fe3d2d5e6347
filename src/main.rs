//! swift-exporter Binary Entry Point
//!
//! Core functionality is provided by the `swift_exporter` library crate.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swift_exporter::{
    collector::{self, CollectorRegistry, CollectorSettings},
    config::{AppConfig, DEFAULT_CONFIG_PATH, parse_duration},
    server::{AppState, create_router},
    topology::TopologyStore,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus exporter for OpenStack Swift
#[derive(Parser, Debug)]
#[command(name = "swift-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file [default: /etc/swift_exporter.yaml]
    #[arg(short, long, env = "SWIFT_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, `:port` for all interfaces (overrides config file)
    #[arg(long = "web.listen-address", env = "SWIFT_EXPORTER_LISTEN_ADDRESS")]
    listen_address: Option<String>,

    /// Path under which to expose metrics (overrides config file)
    #[arg(long = "web.telemetry-path")]
    telemetry_path: Option<String>,

    /// Maximum number of parallel scrape requests (overrides config file)
    #[arg(long = "web.max-requests")]
    max_requests: Option<usize>,

    /// Topology JSON file (overrides config file)
    #[arg(long = "topology.path")]
    topology_path: Option<PathBuf>,

    /// Topology refresh period for the `interval` policy, e.g. `5m`
    #[arg(long = "topology.refresh-interval", value_parser = parse_duration)]
    refresh_interval: Option<Duration>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long)]
    debug: bool,

    /// Include source file and line in log lines
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.verbose);

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "swift-exporter failed");
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool, verbose: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting swift-exporter");

    // Load configuration from file
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            AppConfig::load(path)?
        }
        None => AppConfig::load_or_default(DEFAULT_CONFIG_PATH)?,
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(addr) = cli.listen_address {
        config.web.listen_address = addr;
    }
    if let Some(path) = cli.telemetry_path {
        config.web.telemetry_path = path;
    }
    if let Some(max) = cli.max_requests {
        config.web.max_requests = max;
    }
    if let Some(path) = cli.topology_path {
        config.topology.path = path;
    }
    if let Some(every) = cli.refresh_interval {
        config.topology.refresh_interval = every;
    }
    config.validate()?;

    // Build the collector registry
    let settings = CollectorSettings {
        namespace: config.namespace.clone(),
        collectors: config.collectors.clone(),
    };
    let registry = collector::register_builtin(CollectorRegistry::builder(settings))?
        .default_collectors(config.default_collectors.iter().cloned())
        .build()?;
    tracing::info!(
        collectors = ?registry.names(),
        defaults = ?registry.default_names(),
        "Collector registry ready"
    );

    // Initial topology load; failure is fatal
    let topology = Arc::new(
        TopologyStore::open(config.topology.source(), config.topology.refresh).await?,
    );
    tracing::info!(
        policy = ?topology.policy(),
        servers = topology.current().await.server_count(),
        "Topology loaded"
    );
    let refresher = topology.spawn_refresher(config.topology.refresh_interval);

    let state = AppState::new(Arc::new(registry), Arc::clone(&topology), &config.web);
    let app = create_router(state);

    let addr = config.web.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "Listening on: http://{}{}",
        addr,
        config.web.telemetry_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = refresher {
        handle.abort();
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

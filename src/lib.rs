//! swift-exporter - Prometheus exporter for OpenStack Swift
//!
//! Probes a Swift cluster on every scrape and exposes the results in the
//! Prometheus text format. It can be used as a library, or run as the
//! standalone `swift-exporter` binary.
//!
//! # Architecture
//!
//! - **Collectors**: Server reachability, recon disk usage and proxy write/delete probes
//! - **Metrics**: Sample sink shared by concurrent probes, text exposition
//! - **Topology**: Cluster member snapshot with its refresh policy
//! - **Presentation**: Axum web server
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swift_exporter::{AppConfig, AppState, CollectorRegistry, CollectorSettings, TopologyStore};
//! use swift_exporter::{collector, server::create_router};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load("/etc/swift_exporter.yaml")?;
//! let settings = CollectorSettings {
//!     namespace: config.namespace.clone(),
//!     collectors: config.collectors.clone(),
//! };
//! let registry = collector::register_builtin(CollectorRegistry::builder(settings))?.build()?;
//! let topology = TopologyStore::open(config.topology.source(), config.topology.refresh).await?;
//!
//! let state = AppState::new(Arc::new(registry), Arc::new(topology), &config.web);
//! let listener = tokio::net::TcpListener::bind(config.web.socket_addr()?).await?;
//! axum::serve(listener, create_router(state)).await?;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod metrics;
pub mod server;
pub mod topology;

pub use collector::{
    Collector, CollectorError, CollectorRegistry, CollectorSettings, RegistryError, ScrapeContext,
    ScrapeCoordinator,
};
pub use config::{AppConfig, ConfigError};
pub use metrics::{MetricDesc, MetricSink, Sample};
pub use server::{AppState, create_router};
pub use topology::{RefreshPolicy, TopologySnapshot, TopologyStore};

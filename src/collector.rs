//! Collector Layer
//!
//! Pluggable collectors probing one domain of the cluster each time a scrape
//! runs. Collectors fan out one task per target and write results into a
//! shared [`MetricSink`](crate::metrics::MetricSink).
//!
//! # Architecture
//!
//! - [`Collector`]: Core trait for implementing collectors
//! - [`CollectorRegistry`]: Immutable name → factory mapping built at start-up
//! - [`ScrapeCoordinator`]: Runs a resolved collector set concurrently with instrumentation
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swift_exporter::collector::{
//!     self, CollectorRegistry, CollectorSettings, ScrapeContext, ScrapeCoordinator,
//! };
//! use swift_exporter::config::CollectorsConfig;
//! use swift_exporter::topology::TopologySnapshot;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = CollectorSettings {
//!     namespace: "swift".to_string(),
//!     collectors: CollectorsConfig::default(),
//! };
//! let registry = collector::register_builtin(CollectorRegistry::builder(settings))?.build()?;
//! let collectors = registry.resolve(&["server", "disk"])?;
//! let ctx = ScrapeContext::new(Arc::new(TopologySnapshot::default()));
//! let samples = ScrapeCoordinator::new("swift").scrape(collectors, ctx).await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

mod coordinator;
pub mod disk;
pub mod proxy;
mod registry;
pub mod server;
mod traits;

pub use coordinator::ScrapeCoordinator;
pub use registry::{
    CollectorFactory, CollectorRegistry, CollectorRegistryBuilder, CollectorSettings,
    DEFAULT_COLLECTORS, RegistryError,
};
pub use traits::{Collector, CollectorError, ScrapeContext};

/// Register the `server`, `disk` and `proxy` collectors.
pub fn register_builtin(
    builder: CollectorRegistryBuilder,
) -> Result<CollectorRegistryBuilder, RegistryError> {
    builder
        .register(server::NAME, |settings: &CollectorSettings| {
            let collector = server::ServerCollector::new(
                &settings.namespace,
                settings.collectors.server.clone(),
            );
            Ok(Arc::new(collector) as Arc<dyn Collector>)
        })?
        .register(disk::NAME, |settings: &CollectorSettings| {
            let collector =
                disk::DiskCollector::new(&settings.namespace, settings.collectors.disk.clone())?;
            Ok(Arc::new(collector) as Arc<dyn Collector>)
        })?
        .register(proxy::NAME, |settings: &CollectorSettings| {
            let collector =
                proxy::ProxyCollector::new(&settings.namespace, settings.collectors.proxy.clone())?;
            Ok(Arc::new(collector) as Arc<dyn Collector>)
        })
}

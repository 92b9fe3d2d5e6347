//! Core collector traits and types.

use std::sync::Arc;

use thiserror::Error;

use crate::metrics::{MetricDesc, MetricSink};
use crate::topology::TopologySnapshot;

/// Errors that can occur during collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Required settings are missing or invalid.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote answered with a non-success status.
    #[error("unexpected http status {0}")]
    UnexpectedStatus(u16),

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The update task panicked or was cancelled.
    #[error("collector task failed: {0}")]
    Panicked(String),
}

/// Per-scrape inputs shared by all collectors of one scrape.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    topology: Arc<TopologySnapshot>,
}

impl ScrapeContext {
    pub fn new(topology: Arc<TopologySnapshot>) -> Self {
        Self { topology }
    }

    /// Cluster members probed by this scrape.
    pub fn topology(&self) -> &TopologySnapshot {
        &self.topology
    }
}

/// A named probing domain.
///
/// # Error Handling Philosophy
///
/// - **Target failures** (node unreachable, bad JSON from one node, failed
///   auth on one proxy) are data. They are emitted as 0-valued samples and
///   `update()` still returns `Ok(())`.
///
/// - **Collector errors** (the domain-level operation could not be attempted,
///   e.g. required settings are missing) are returned as `Err`. The scrape
///   coordinator turns them into a `collector_success` of 0.
///
/// Every sample emitted must use one of the descriptors returned by
/// [`Collector::descriptors`].
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Registry name (e.g., "server", "disk").
    fn name(&self) -> &str;

    /// Descriptors this collector emits samples for.
    fn descriptors(&self) -> Vec<Arc<MetricDesc>>;

    /// Run all probes of this domain against the scrape's topology and emit
    /// their results into `sink`. Must not return before every spawned probe
    /// has finished.
    async fn update(&self, ctx: &ScrapeContext, sink: &MetricSink) -> Result<(), CollectorError>;
}

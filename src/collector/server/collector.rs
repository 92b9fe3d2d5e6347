//! TCP reachability probe collector.
//!
//! One connect attempt per server and tier on every scrape.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::collector::{Collector, CollectorError, ScrapeContext};
use crate::metrics::{MetricDesc, MetricSink};
use crate::topology::Tier;

/// Registry name.
pub const NAME: &str = "server";

/// Default connection timeout (3 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration for the reachability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProbeConfig {
    /// Connect timeout per server (default: 3s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ServerProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ServerProbeConfig {
    /// Set the connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Reachability collector for all three server tiers.
///
/// Reports 1 for every server accepting a TCP connection within the timeout
/// and 0 otherwise. Unreachable servers are data, so `update()` never fails.
pub struct ServerCollector {
    config: ServerProbeConfig,
    account_status: Arc<MetricDesc>,
    container_status: Arc<MetricDesc>,
    object_status: Arc<MetricDesc>,
}

impl ServerCollector {
    pub fn new(namespace: &str, config: ServerProbeConfig) -> Self {
        Self {
            config,
            account_status: MetricDesc::new(
                namespace,
                "server",
                "account_status",
                "Swift account-server reachability.",
                &["host"],
            ),
            container_status: MetricDesc::new(
                namespace,
                "server",
                "container_status",
                "Swift container-server reachability.",
                &["host"],
            ),
            object_status: MetricDesc::new(
                namespace,
                "server",
                "object_status",
                "Swift object-server reachability.",
                &["host"],
            ),
        }
    }

    fn status_desc(&self, tier: Tier) -> &Arc<MetricDesc> {
        match tier {
            Tier::Account => &self.account_status,
            Tier::Container => &self.container_status,
            Tier::Object => &self.object_status,
        }
    }
}

impl std::fmt::Debug for ServerCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCollector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Collector for ServerCollector {
    fn name(&self) -> &str {
        NAME
    }

    fn descriptors(&self) -> Vec<Arc<MetricDesc>> {
        vec![
            Arc::clone(&self.account_status),
            Arc::clone(&self.container_status),
            Arc::clone(&self.object_status),
        ]
    }

    async fn update(&self, ctx: &ScrapeContext, sink: &MetricSink) -> Result<(), CollectorError> {
        let probe_timeout = self.config.timeout;
        let mut checks = JoinSet::new();

        for (tier, host, port) in ctx.topology().servers() {
            let desc = Arc::clone(self.status_desc(tier));
            let (host, port) = (host.to_owned(), port.to_owned());
            let sink = sink.clone();

            checks.spawn(async move {
                let status = check_port(&host, &port, probe_timeout).await;
                tracing::debug!(%tier, host = %host, port = %port, status, "Server probe finished");
                sink.emit(&desc, status, &[host.as_str()]);
            });
        }

        while let Some(joined) = checks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Server probe task failed");
            }
        }
        Ok(())
    }
}

/// Check port connectivity. Returns 1 if a connection was established within
/// `probe_timeout`, otherwise 0.
pub async fn check_port(host: &str, port: &str, probe_timeout: Duration) -> f64 {
    let Ok(port) = port.parse::<u16>() else {
        tracing::warn!(host = %host, port = %port, "Invalid server port");
        return 0.0;
    };

    connect_status(host, port, probe_timeout, TcpStream::connect((host, port))).await
}

/// 1 if `connect` resolves successfully within `probe_timeout`, otherwise 0.
async fn connect_status<T>(
    host: &str,
    port: u16,
    probe_timeout: Duration,
    connect: impl Future<Output = io::Result<T>>,
) -> f64 {
    match timeout(probe_timeout, connect).await {
        Ok(Ok(_stream)) => 1.0,
        Ok(Err(e)) => {
            tracing::warn!(host = %host, port, error = %e, "Server probe failed");
            0.0
        }
        Err(_) => {
            tracing::warn!(
                host = %host,
                port,
                timeout_ms = probe_timeout.as_millis(),
                "Server probe timed out"
            );
            0.0
        }
    }
}

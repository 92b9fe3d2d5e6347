//! Disk usage collector over the object-node recon endpoint.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::recon::fetch_disk_usage;
use crate::collector::{Collector, CollectorError, ScrapeContext};
use crate::metrics::{MetricDesc, MetricSink};
use crate::topology::ObjectNode;

/// Registry name.
pub const NAME: &str = "disk";

/// Default recon request timeout (10 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffer of each totals channel.
const TOTALS_CHANNEL_CAPACITY: usize = 64;

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration for the disk usage collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskProbeConfig {
    /// Recon request timeout (default: 10s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DiskProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl DiskProbeConfig {
    /// Set the recon request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Senders feeding the three totals accumulators.
#[derive(Clone)]
struct TotalsTx {
    used: mpsc::Sender<f64>,
    avail: mpsc::Sender<f64>,
    size: mpsc::Sender<f64>,
}

/// Disk usage collector.
///
/// Fetches `/recon/diskusage` from every object node, reports used, avail
/// and size for each mounted device on the node's allow-list, and sums them
/// into cluster-wide totals. A node that cannot be fetched contributes
/// nothing and is reported through `<ns>_disk_recon_success{host} 0`.
pub struct DiskCollector {
    config: DiskProbeConfig,
    client: Client,
    used: Arc<MetricDesc>,
    avail: Arc<MetricDesc>,
    size: Arc<MetricDesc>,
    total_used: Arc<MetricDesc>,
    total_avail: Arc<MetricDesc>,
    total_size: Arc<MetricDesc>,
    recon_success: Arc<MetricDesc>,
}

impl DiskCollector {
    /// Create a disk collector.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` if the HTTP client cannot be built.
    pub fn new(namespace: &str, config: DiskProbeConfig) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CollectorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let device = |name: &str, help: &str| {
            MetricDesc::new(namespace, "disk", name, help, &["host", "device"])
        };
        let total = |name: &str, help: &str| MetricDesc::new(namespace, "disk", name, help, &[]);

        Ok(Self {
            config,
            client,
            used: device("used_bytes", "Used bytes of a Swift storage device."),
            avail: device("avail_bytes", "Available bytes of a Swift storage device."),
            size: device("size_bytes", "Size in bytes of a Swift storage device."),
            total_used: total("total_used_bytes", "Used bytes across all reported devices."),
            total_avail: total(
                "total_avail_bytes",
                "Available bytes across all reported devices.",
            ),
            total_size: total("total_size_bytes", "Size in bytes of all reported devices."),
            recon_success: MetricDesc::new(
                namespace,
                "disk",
                "recon_success",
                "Whether the recon disk usage request of an object node succeeded.",
                &["host"],
            ),
        })
    }

    /// Fetch one node and emit its device samples.
    async fn probe_node(
        client: Client,
        node: ObjectNode,
        descs: [Arc<MetricDesc>; 4],
        sink: MetricSink,
        totals: TotalsTx,
    ) {
        let [used, avail, size, recon_success] = descs;
        let host = node.host.as_str();

        let records = match fetch_disk_usage(&client, host, &node.port).await {
            Ok(records) => {
                sink.emit(&recon_success, 1.0, &[host]);
                records
            }
            Err(e) => {
                tracing::warn!(
                    host = %host,
                    port = %node.port,
                    error = %e,
                    "Disk usage fetch failed"
                );
                sink.emit(&recon_success, 0.0, &[host]);
                return;
            }
        };

        for record in records.iter().filter(|r| r.is_selected(&node.devices)) {
            let labels = [host, record.device.as_str()];
            sink.emit(&used, record.used, &labels);
            sink.emit(&avail, record.avail, &labels);
            sink.emit(&size, record.size, &labels);

            // Send only fails once an accumulator is gone, which update() rules out.
            let _ = totals.used.send(record.used).await;
            let _ = totals.avail.send(record.avail).await;
            let _ = totals.size.send(record.size).await;
        }
        tracing::debug!(host = %host, records = records.len(), "Disk usage fetched");
    }
}

impl std::fmt::Debug for DiskCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCollector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Sum a channel until every sender is dropped, then emit the total.
async fn accumulate(mut rx: mpsc::Receiver<f64>, desc: Arc<MetricDesc>, sink: MetricSink) {
    let mut total = 0.0;
    while let Some(value) = rx.recv().await {
        total += value;
    }
    sink.emit(&desc, total, &[]);
}

#[async_trait::async_trait]
impl Collector for DiskCollector {
    fn name(&self) -> &str {
        NAME
    }

    fn descriptors(&self) -> Vec<Arc<MetricDesc>> {
        vec![
            Arc::clone(&self.used),
            Arc::clone(&self.avail),
            Arc::clone(&self.size),
            Arc::clone(&self.total_used),
            Arc::clone(&self.total_avail),
            Arc::clone(&self.total_size),
            Arc::clone(&self.recon_success),
        ]
    }

    async fn update(&self, ctx: &ScrapeContext, sink: &MetricSink) -> Result<(), CollectorError> {
        let (used_tx, used_rx) = mpsc::channel(TOTALS_CHANNEL_CAPACITY);
        let (avail_tx, avail_rx) = mpsc::channel(TOTALS_CHANNEL_CAPACITY);
        let (size_tx, size_rx) = mpsc::channel(TOTALS_CHANNEL_CAPACITY);

        let mut accumulators = JoinSet::new();
        accumulators.spawn(accumulate(used_rx, Arc::clone(&self.total_used), sink.clone()));
        accumulators.spawn(accumulate(avail_rx, Arc::clone(&self.total_avail), sink.clone()));
        accumulators.spawn(accumulate(size_rx, Arc::clone(&self.total_size), sink.clone()));

        let totals = TotalsTx {
            used: used_tx,
            avail: avail_tx,
            size: size_tx,
        };

        let mut fetches = JoinSet::new();
        for node in &ctx.topology().object {
            fetches.spawn(Self::probe_node(
                self.client.clone(),
                node.clone(),
                [
                    Arc::clone(&self.used),
                    Arc::clone(&self.avail),
                    Arc::clone(&self.size),
                    Arc::clone(&self.recon_success),
                ],
                sink.clone(),
                totals.clone(),
            ));
        }

        while let Some(joined) = fetches.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Disk usage task failed");
            }
        }

        // Last senders: the accumulators see end-of-stream once these go.
        drop(totals);

        while let Some(joined) = accumulators.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Disk totals task failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Sample;
    use crate::topology::TopologySnapshot;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::io::ErrorKind;
    use tokio::net::TcpListener;

    const NODE_A: &str = r#"[
        {"device": "sda", "mounted": true, "used": 100, "avail": 900, "size": 1000},
        {"device": "sdb", "mounted": false, "used": 7, "avail": 7, "size": 14},
        {"device": "sdc", "mounted": true, "used": 5, "avail": 5, "size": 10}
    ]"#;

    const NODE_B: &str = r#"[
        {"device": "sda", "mounted": true, "used": 50, "avail": 150, "size": 200},
        {"device": "sdx", "mounted": "Input/output error", "used": "", "avail": "", "size": ""}
    ]"#;

    /// Serve a fixed recon response on loopback.
    ///
    /// Returns `None` where the sandbox disallows binding.
    async fn recon_server(status: StatusCode, body: &'static str) -> Option<String> {
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(l) => l,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => return None,
            Err(e) => panic!("Failed to bind test listener: {e}"),
        };
        let port = listener.local_addr().unwrap().port();
        let app = Router::new().route(
            "/recon/diskusage",
            get(move || async move { (status, body) }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Some(port.to_string())
    }

    async fn closed_port() -> Option<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await.ok()?;
        let port = listener.local_addr().ok()?.port();
        drop(listener);
        Some(port.to_string())
    }

    async fn run(snapshot: TopologySnapshot) -> Vec<Sample> {
        let collector = DiskCollector::new(
            "swift",
            DiskProbeConfig::default().with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let (sink, rx) = MetricSink::channel();
        collector
            .update(&ScrapeContext::new(Arc::new(snapshot)), &sink)
            .await
            .unwrap();
        drop(sink);
        rx.drain()
    }

    fn value(samples: &[Sample], name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        samples
            .iter()
            .find(|s| s.name() == name && labels.iter().all(|(k, v)| s.label(k) == Some(*v)))
            .map(|s| s.value)
    }

    fn count(samples: &[Sample], name: &str) -> usize {
        samples.iter().filter(|s| s.name() == name).count()
    }

    #[tokio::test]
    async fn test_totals_equal_sum_of_filtered_devices() {
        let (Some(a), Some(b)) = (
            recon_server(StatusCode::OK, NODE_A).await,
            recon_server(StatusCode::OK, NODE_B).await,
        ) else {
            return;
        };

        // sdc is mounted but not allowed on node A; sdb is allowed but unmounted.
        let snapshot = TopologySnapshot {
            object: vec![
                ObjectNode::new("127.0.0.1", &a, ["sda", "sdb"]),
                ObjectNode::new("localhost", &b, ["sda", "sdx"]),
            ],
            ..Default::default()
        };
        let samples = run(snapshot).await;

        assert_eq!(count(&samples, "swift_disk_used_bytes"), 2);
        assert_eq!(
            value(&samples, "swift_disk_used_bytes", &[("host", "127.0.0.1"), ("device", "sda")]),
            Some(100.0)
        );
        assert_eq!(
            value(&samples, "swift_disk_size_bytes", &[("host", "localhost"), ("device", "sda")]),
            Some(200.0)
        );
        assert_eq!(value(&samples, "swift_disk_total_used_bytes", &[]), Some(150.0));
        assert_eq!(value(&samples, "swift_disk_total_avail_bytes", &[]), Some(1050.0));
        assert_eq!(value(&samples, "swift_disk_total_size_bytes", &[]), Some(1200.0));
        assert_eq!(count(&samples, "swift_disk_total_size_bytes"), 1);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_isolated() {
        let (Some(a), Some(dead)) = (
            recon_server(StatusCode::OK, NODE_A).await,
            closed_port().await,
        ) else {
            return;
        };

        let snapshot = TopologySnapshot {
            object: vec![
                ObjectNode::new("127.0.0.1", &a, ["sda"]),
                ObjectNode::new("127.0.0.2", &dead, ["sda"]),
            ],
            ..Default::default()
        };
        let samples = run(snapshot).await;

        let success = |host: &str| value(&samples, "swift_disk_recon_success", &[("host", host)]);
        assert_eq!(success("127.0.0.1"), Some(1.0));
        assert_eq!(success("127.0.0.2"), Some(0.0));
        assert_eq!(count(&samples, "swift_disk_used_bytes"), 1);
        assert_eq!(value(&samples, "swift_disk_total_used_bytes", &[]), Some(100.0));
    }

    #[tokio::test]
    async fn test_error_status_and_bad_body_count_as_fetch_failure() {
        let (Some(failing), Some(garbage)) = (
            recon_server(StatusCode::INTERNAL_SERVER_ERROR, NODE_A).await,
            recon_server(StatusCode::OK, "{\"not\": \"a list\"}").await,
        ) else {
            return;
        };

        let snapshot = TopologySnapshot {
            object: vec![
                ObjectNode::new("127.0.0.1", &failing, ["sda"]),
                ObjectNode::new("localhost", &garbage, ["sda"]),
            ],
            ..Default::default()
        };
        let samples = run(snapshot).await;

        let success = |host: &str| value(&samples, "swift_disk_recon_success", &[("host", host)]);
        assert_eq!(success("127.0.0.1"), Some(0.0));
        assert_eq!(success("localhost"), Some(0.0));
        assert_eq!(count(&samples, "swift_disk_used_bytes"), 0);
        assert_eq!(value(&samples, "swift_disk_total_used_bytes", &[]), Some(0.0));
    }

    #[tokio::test]
    async fn test_totals_emitted_for_empty_topology() {
        let samples = run(TopologySnapshot::default()).await;
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| s.value == 0.0 && s.label_values.is_empty()));
    }

    #[tokio::test]
    async fn test_many_records_exceed_channel_capacity() {
        // More records than the totals buffer holds.
        let body: &'static str = Box::leak(
            format!(
                "[{}]",
                (0..TOTALS_CHANNEL_CAPACITY * 3)
                    .map(|i| format!(
                        r#"{{"device": "d{i}", "mounted": true, "used": 1, "avail": 2, "size": 3}}"#
                    ))
                    .collect::<Vec<_>>()
                    .join(",")
            )
            .into_boxed_str(),
        );
        let Some(port) = recon_server(StatusCode::OK, body).await else {
            return;
        };

        let devices: Vec<String> = (0..TOTALS_CHANNEL_CAPACITY * 3)
            .map(|i| format!("d{i}"))
            .collect();
        let snapshot = TopologySnapshot {
            object: vec![ObjectNode::new("127.0.0.1", &port, devices)],
            ..Default::default()
        };
        let samples = run(snapshot).await;

        let n = (TOTALS_CHANNEL_CAPACITY * 3) as f64;
        assert_eq!(value(&samples, "swift_disk_total_used_bytes", &[]), Some(n));
        assert_eq!(value(&samples, "swift_disk_total_size_bytes", &[]), Some(3.0 * n));
    }

    #[test]
    fn test_config_defaults() {
        assert_eq!(DiskProbeConfig::default().timeout, DEFAULT_TIMEOUT);
        let config: DiskProbeConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_descriptors() {
        let collector = DiskCollector::new("swift", DiskProbeConfig::default()).unwrap();
        let names: Vec<_> = collector
            .descriptors()
            .iter()
            .map(|d| d.fq_name().to_string())
            .collect();
        assert_eq!(names.len(), 7);
        assert!(names.contains(&"swift_disk_total_avail_bytes".to_string()));
        assert!(names.contains(&"swift_disk_recon_success".to_string()));
    }
}

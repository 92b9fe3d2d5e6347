//! Write/delete probe collector.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use super::client::{Credentials, ObjectStore, ObjectStoreError, SwiftClient};
use crate::collector::{Collector, CollectorError, ScrapeContext};
use crate::metrics::{MetricDesc, MetricSink};

/// Registry name.
pub const NAME: &str = "proxy";

/// Default probe object size (10 MiB).
const DEFAULT_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Default timeout of each Swift request (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-process sequence separating probe objects created in the same second.
static OBJECT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Probe object name, `<unix-seconds>_<seq>_<proxy>`.
fn object_name(proxy: &str) -> String {
    let seq = OBJECT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{}", chrono::Utc::now().timestamp(), seq, proxy)
}

fn default_payload_size() -> usize {
    DEFAULT_PAYLOAD_SIZE
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration for the write/delete probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyProbeConfig {
    /// Container the probe object is written to.
    #[serde(default)]
    pub container: String,

    /// Proxy endpoints as `host:port`. Entries may hold comma-separated lists.
    #[serde(default)]
    pub proxies: Vec<String>,

    /// Storage account segment, e.g. `AUTH_test`. Taken from the auth
    /// response when empty.
    #[serde(default)]
    pub account: String,

    #[serde(flatten)]
    pub credentials: Credentials,

    /// Probe object size in bytes (default: 10 MiB).
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,

    /// Timeout of each Swift request (default: 30s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProxyProbeConfig {
    fn default() -> Self {
        Self {
            container: String::new(),
            proxies: Vec::new(),
            account: String::new(),
            credentials: Credentials::default(),
            payload_size: DEFAULT_PAYLOAD_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ProxyProbeConfig {
    /// Proxy endpoints with comma-separated entries split and blanks removed.
    pub fn endpoints(&self) -> Vec<String> {
        self.proxies
            .iter()
            .flat_map(|entry| entry.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Set the target container.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    /// Set the proxy endpoints.
    pub fn with_proxies<I, S>(mut self, proxies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.proxies = proxies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the probe object size.
    pub fn with_payload_size(mut self, size: usize) -> Self {
        self.payload_size = size;
        self
    }
}

/// One proxy's write/delete check.
struct ProxyProbe<S> {
    store: Arc<S>,
    proxy: String,
    container: String,
    account: String,
    payload_size: usize,
    put_status: Arc<MetricDesc>,
    delete_status: Arc<MetricDesc>,
    sink: MetricSink,
}

impl<S: ObjectStore> ProxyProbe<S> {
    async fn run(self) {
        let proxy = self.proxy.as_str();

        let session = match self.store.authenticate().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(proxy = %proxy, error = %e, "Swift authentication failed");
                let error = e.to_string();
                self.sink.emit(&self.put_status, 0.0, &[proxy, "", error.as_str()]);
                self.sink.emit(&self.delete_status, 0.0, &[proxy, "", error.as_str()]);
                return;
            }
        };

        let account = if self.account.is_empty() {
            session.account().unwrap_or_default()
        } else {
            self.account.clone()
        };
        let session = session.with_storage_url(format!("http://{proxy}/v1/{account}"));
        let object = object_name(proxy);

        let put = self
            .store
            .put_object(&session, &self.container, &object, vec![0; self.payload_size])
            .await;
        self.emit_status(&self.put_status, "PUT", &object, put.err());

        // The delete runs even after a failed put, so a partial upload is removed.
        let delete = self
            .store
            .delete_object(&session, &self.container, &object)
            .await;
        self.emit_status(&self.delete_status, "DELETE", &object, delete.err());
    }

    fn emit_status(
        &self,
        desc: &Arc<MetricDesc>,
        method: &str,
        object: &str,
        error: Option<ObjectStoreError>,
    ) {
        match error {
            None => {
                tracing::debug!(
                    proxy = %self.proxy,
                    object = %object,
                    method,
                    "Proxy request succeeded"
                );
                self.sink.emit(desc, 1.0, &[self.proxy.as_str(), object, ""]);
            }
            Some(e) => {
                tracing::warn!(
                    proxy = %self.proxy,
                    object = %object,
                    method,
                    error = %e,
                    "Proxy request failed"
                );
                let error = e.to_string();
                self.sink.emit(desc, 0.0, &[self.proxy.as_str(), object, error.as_str()]);
            }
        }
    }
}

/// Write/delete probe over every configured proxy.
///
/// Each proxy is checked independently: authenticate, PUT a zero-filled
/// object, DELETE it. Missing `container` or `proxies` settings fail the
/// whole collector.
pub struct ProxyCollector<S = SwiftClient> {
    config: ProxyProbeConfig,
    store: Arc<S>,
    put_status: Arc<MetricDesc>,
    delete_status: Arc<MetricDesc>,
}

impl ProxyCollector<SwiftClient> {
    /// Create a proxy collector talking to Swift over HTTP.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` if the HTTP client cannot be built.
    pub fn new(namespace: &str, config: ProxyProbeConfig) -> Result<Self, CollectorError> {
        let store = SwiftClient::new(config.credentials.clone(), config.timeout)
            .map_err(|e| CollectorError::Config(format!("Failed to build Swift client: {}", e)))?;
        Ok(Self::with_store(namespace, config, store))
    }
}

impl<S: ObjectStore> ProxyCollector<S> {
    /// Create a proxy collector over any [`ObjectStore`].
    pub fn with_store(namespace: &str, config: ProxyProbeConfig, store: S) -> Self {
        let labels = &["proxy", "object", "error"];
        Self {
            config,
            store: Arc::new(store),
            put_status: MetricDesc::new(
                namespace,
                "",
                "put_status",
                "Swift proxy-server put request test status.",
                labels,
            ),
            delete_status: MetricDesc::new(
                namespace,
                "",
                "delete_status",
                "Swift proxy-server delete request test status.",
                labels,
            ),
        }
    }
}

impl<S> std::fmt::Debug for ProxyCollector<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCollector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<S: ObjectStore> Collector for ProxyCollector<S> {
    fn name(&self) -> &str {
        NAME
    }

    fn descriptors(&self) -> Vec<Arc<MetricDesc>> {
        vec![
            Arc::clone(&self.put_status),
            Arc::clone(&self.delete_status),
        ]
    }

    async fn update(&self, _ctx: &ScrapeContext, sink: &MetricSink) -> Result<(), CollectorError> {
        if self.config.container.is_empty() {
            return Err(CollectorError::Config("no container provided".to_string()));
        }
        let proxies = self.config.endpoints();
        if proxies.is_empty() {
            return Err(CollectorError::Config("no proxys provided".to_string()));
        }

        let mut probes = JoinSet::new();
        for proxy in proxies {
            let probe = ProxyProbe {
                store: Arc::clone(&self.store),
                proxy,
                container: self.config.container.clone(),
                account: self.config.account.clone(),
                payload_size: self.config.payload_size,
                put_status: Arc::clone(&self.put_status),
                delete_status: Arc::clone(&self.delete_status),
                sink: sink.clone(),
            };
            probes.spawn(probe.run());
        }

        while let Some(joined) = probes.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Proxy probe task failed");
            }
        }
        Ok(())
    }
}

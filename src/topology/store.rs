//! Current-snapshot holder with refresh policy.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::{TopologyError, TopologySnapshot, TopologySource};

/// When the topology is reloaded from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Load once at start-up.
    #[default]
    Startup,
    /// Reload before every scrape starts.
    PerScrape,
    /// Reload periodically from a background task.
    Interval,
}

/// Holds the current [`TopologySnapshot`].
///
/// Scrapes take an `Arc` of the snapshot once and keep it for their whole
/// duration. A refresh builds a complete new snapshot and swaps the `Arc`,
/// so in-flight scrapes never observe a partially updated topology.
/// Refreshes are serialized.
///
/// After the initial load, a failed refresh keeps the last good snapshot.
pub struct TopologyStore {
    source: Option<TopologySource>,
    policy: RefreshPolicy,
    current: RwLock<Arc<TopologySnapshot>>,
    refresh_lock: Mutex<()>,
}

impl TopologyStore {
    /// Load the initial snapshot from `source`.
    ///
    /// # Errors
    /// Returns the load error; callers treat it as fatal.
    pub async fn open(
        source: TopologySource,
        policy: RefreshPolicy,
    ) -> Result<Self, TopologyError> {
        let snapshot = source.load().await?;
        tracing::info!(
            path = %source.path().display(),
            servers = snapshot.server_count(),
            ?policy,
            "Topology loaded"
        );

        Ok(Self {
            source: Some(source),
            policy,
            current: RwLock::new(Arc::new(snapshot)),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Store serving a fixed snapshot with no source behind it.
    pub fn from_snapshot(snapshot: TopologySnapshot) -> Self {
        Self {
            source: None,
            policy: RefreshPolicy::Startup,
            current: RwLock::new(Arc::new(snapshot)),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Configured refresh policy.
    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// The current snapshot.
    pub async fn current(&self) -> Arc<TopologySnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// The snapshot a new scrape should use, refreshing first under the
    /// `per_scrape` policy.
    pub async fn snapshot_for_scrape(&self) -> Arc<TopologySnapshot> {
        if self.policy == RefreshPolicy::PerScrape {
            self.refresh_or_keep().await;
        }
        self.current().await
    }

    /// Reload from the source and swap in the new snapshot.
    ///
    /// A store without a source is left unchanged.
    pub async fn refresh(&self) -> Result<(), TopologyError> {
        let Some(source) = &self.source else {
            return Ok(());
        };

        let _guard = self.refresh_lock.lock().await;
        let snapshot = source.load().await?;
        tracing::debug!(servers = snapshot.server_count(), "Topology refreshed");
        *self.current.write().await = Arc::new(snapshot);
        Ok(())
    }

    async fn refresh_or_keep(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "Topology refresh failed, keeping last good snapshot");
        }
    }

    /// Spawn the background refresher for the `interval` policy.
    ///
    /// Returns `None` for other policies. The first refresh happens one
    /// `every` after the call.
    pub fn spawn_refresher(self: &Arc<Self>, every: Duration) -> Option<JoinHandle<()>> {
        if self.policy != RefreshPolicy::Interval {
            return None;
        }

        let store = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.refresh_or_keep().await;
            }
        }))
    }
}

impl std::fmt::Debug for TopologyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyStore")
            .field("source", &self.source)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::ServerNode;

    fn write_topology(path: &std::path::Path, hosts: &[&str]) {
        let account: Vec<_> = hosts
            .iter()
            .map(|h| serde_json::json!({ "host": h, "port": "6002" }))
            .collect();
        std::fs::write(path, serde_json::json!({ "account": account }).to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_open_fails_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = TopologySource::new(dir.path().join("missing.json"));
        assert!(TopologyStore::open(source, RefreshPolicy::Startup).await.is_err());
    }

    #[tokio::test]
    async fn test_startup_policy_keeps_initial_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");
        write_topology(&path, &["10.0.0.1"]);

        let store = TopologyStore::open(TopologySource::new(&path), RefreshPolicy::Startup)
            .await
            .unwrap();
        write_topology(&path, &["10.0.0.1", "10.0.0.9"]);

        assert_eq!(store.policy(), RefreshPolicy::Startup);
        assert_eq!(store.snapshot_for_scrape().await.account.len(), 1);
    }

    #[tokio::test]
    async fn test_per_scrape_policy_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");
        write_topology(&path, &["10.0.0.1"]);

        let store = TopologyStore::open(TopologySource::new(&path), RefreshPolicy::PerScrape)
            .await
            .unwrap();
        let before = store.snapshot_for_scrape().await;

        write_topology(&path, &["10.0.0.1", "10.0.0.9"]);
        let after = store.snapshot_for_scrape().await;

        // The earlier handle is unaffected by the swap.
        assert_eq!(before.account.len(), 1);
        assert_eq!(after.account[1], ServerNode::new("10.0.0.9", "6002"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_good_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");
        write_topology(&path, &["10.0.0.1"]);

        let store = TopologyStore::open(TopologySource::new(&path), RefreshPolicy::PerScrape)
            .await
            .unwrap();
        std::fs::write(&path, "{ truncated").unwrap();

        assert!(store.refresh().await.is_err());
        let snapshot = store.snapshot_for_scrape().await;
        assert_eq!(snapshot.account[0].host, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_refresher_only_for_interval_policy() {
        let store = Arc::new(TopologyStore::from_snapshot(TopologySnapshot::default()));
        assert!(store.spawn_refresher(Duration::from_secs(60)).is_none());
        assert!(store.refresh().await.is_ok());
    }

    #[tokio::test]
    async fn test_interval_refresher_swaps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");
        write_topology(&path, &["10.0.0.1"]);

        let store = Arc::new(
            TopologyStore::open(TopologySource::new(&path), RefreshPolicy::Interval)
                .await
                .unwrap(),
        );
        write_topology(&path, &["10.0.0.1", "10.0.0.9"]);

        let handle = store.spawn_refresher(Duration::from_millis(20)).unwrap();
        let mut refreshed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if store.current().await.account.len() == 2 {
                refreshed = true;
                break;
            }
        }
        handle.abort();
        assert!(refreshed);
    }
}

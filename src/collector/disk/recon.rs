//! Client side of the Swift recon disk usage endpoint.

use std::collections::BTreeSet;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::collector::CollectorError;

/// Path of the recon disk usage endpoint on object servers.
pub const RECON_DISK_USAGE_PATH: &str = "/recon/diskusage";

/// One device entry of a recon disk usage response.
///
/// Recon reports unmounted drives with empty-string sizes, and drives whose
/// mount check failed with an error string in `mounted`. Such entries do not
/// decode into this type and are skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub device: String,
    pub mounted: bool,
    pub used: f64,
    pub avail: f64,
    pub size: f64,
}

impl DiskUsage {
    /// Whether this record is reported: mounted and on the node's allow-list.
    pub fn is_selected(&self, allowed: &BTreeSet<String>) -> bool {
        self.mounted && allowed.contains(&self.device)
    }
}

/// Recon disk usage URL for an object server.
pub fn disk_usage_url(host: &str, port: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}{RECON_DISK_USAGE_PATH}")
    } else {
        format!("http://{host}:{port}{RECON_DISK_USAGE_PATH}")
    }
}

/// Decode a recon disk usage body.
///
/// The body must be a JSON array. Array entries that do not decode into a
/// [`DiskUsage`] are dropped individually.
pub fn parse_disk_usage(body: &[u8]) -> Result<Vec<DiskUsage>, serde_json::Error> {
    let entries: Vec<serde_json::Value> = serde_json::from_slice(body)?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<DiskUsage>(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable disk record");
                None
            }
        })
        .collect())
}

/// Fetch and decode the disk usage of one object server.
///
/// # Errors
/// Transport errors, non-2xx statuses, and bodies that are not a JSON array.
pub async fn fetch_disk_usage(
    client: &Client,
    host: &str,
    port: &str,
) -> Result<Vec<DiskUsage>, CollectorError> {
    let response = client.get(disk_usage_url(host, port)).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CollectorError::UnexpectedStatus(status.as_u16()));
    }

    let body = response.bytes().await?;
    Ok(parse_disk_usage(&body)?)
}

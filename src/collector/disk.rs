//! Object-node disk usage collector.
//!
//! - [`DiskCollector`]: Per-device and cluster-wide disk usage from the recon middleware
//! - [`DiskUsage`]: Typed record of the `/recon/diskusage` response

mod collector;
mod recon;

pub use collector::{DiskCollector, DiskProbeConfig, NAME};
pub use recon::{
    DiskUsage, RECON_DISK_USAGE_PATH, disk_usage_url, fetch_disk_usage, parse_disk_usage,
};

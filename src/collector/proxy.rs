//! Proxy write/delete collector.
//!
//! - [`ProxyCollector`]: PUT then DELETE a probe object through every proxy
//! - [`ObjectStore`]: Seam between the probe and the Swift API
//! - [`SwiftClient`]: reqwest client with TempAuth (v1) and Keystone (v3) auth

mod client;
mod collector;

pub use client::{Credentials, ObjectStore, ObjectStoreError, Session, SwiftClient};
pub use collector::{NAME, ProxyCollector, ProxyProbeConfig};

//! Topology Layer
//!
//! Cluster member lists consumed by the probes.
//!
//! - [`TopologySnapshot`]: Immutable account/container/object node view
//! - [`TopologySource`]: Loads a snapshot from JSON, optionally regenerating it first
//! - [`TopologyStore`]: Hands out the current snapshot and applies the refresh policy

mod snapshot;
mod source;
mod store;

pub use snapshot::{ObjectNode, ServerNode, Tier, TopologySnapshot};
pub use source::{TopologyError, TopologySource};
pub use store::{RefreshPolicy, TopologyStore};

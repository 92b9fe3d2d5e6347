//! Server reachability collector.
//!
//! - [`ServerCollector`]: TCP connectivity of every account, container and object server

mod collector;

pub use collector::{NAME, ServerCollector, ServerProbeConfig, check_port};

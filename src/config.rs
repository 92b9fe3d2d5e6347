//! Configuration module for swift-exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Web settings (listen address, telemetry path, concurrency limit)
//! - Topology source and refresh policy
//! - Per-collector probe settings (timeouts, proxy credentials)

mod app;
mod collector;
mod validation;

pub use app::{AppConfig, DEFAULT_CONFIG_PATH, TopologyConfig, WebConfig};
pub use collector::CollectorsConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration};

//! Application configuration structures.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::DEFAULT_COLLECTORS;
use crate::topology::{RefreshPolicy, TopologySource};

use super::collector::CollectorsConfig;
use super::validation::{ConfigError, ensure_non_zero, is_valid_metric_name};

// =============================================================================
// Constants
// =============================================================================

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/swift_exporter.yaml";

/// Default topology JSON location.
pub const DEFAULT_TOPOLOGY_PATH: &str = "/etc/swift_exporter.json";

/// Default metric namespace.
pub const DEFAULT_NAMESPACE: &str = "swift";

/// Default topology refresh interval for the `interval` policy (5 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Default limit of concurrent scrapes.
pub const DEFAULT_MAX_REQUESTS: usize = 30;

fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

// =============================================================================
// Web Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Listen address; `:port` binds all interfaces (default: ":9150").
    pub listen_address: String,

    /// Path exposing the metrics (default: "/metrics").
    pub telemetry_path: String,

    /// Maximum number of scrapes served in parallel (default: 30).
    pub max_requests: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: ":9150".to_string(),
            telemetry_path: "/metrics".to_string(),
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

impl WebConfig {
    /// Socket address to bind.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if the address does not parse.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = &self.listen_address;
        let parsed = match addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}").parse::<SocketAddr>(),
            None => addr.parse::<SocketAddr>(),
        };
        parsed.map_err(|_| {
            ConfigError::ValidationError(format!("invalid web listen_address: '{}'", addr))
        })
    }
}

// =============================================================================
// Topology Configuration
// =============================================================================

/// Topology source and refresh settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Topology JSON file (default: "/etc/swift_exporter.json").
    pub path: PathBuf,

    /// Command regenerating `path` before each load. Empty: read only.
    pub command: Vec<String>,

    /// When to reload (default: startup).
    pub refresh: RefreshPolicy,

    /// Reload period for the `interval` policy (default: 5m).
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_TOPOLOGY_PATH),
            command: Vec::new(),
            refresh: RefreshPolicy::default(),
            refresh_interval: default_refresh_interval(),
        }
    }
}

impl TopologyConfig {
    /// Source described by these settings.
    pub fn source(&self) -> TopologySource {
        TopologySource::new(&self.path).with_command(self.command.iter().cloned())
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server configuration.
    pub web: WebConfig,

    /// Metric name prefix (default: "swift").
    pub namespace: String,

    /// Collectors run when a scrape names none (default: [server]).
    pub default_collectors: Vec<String>,

    /// Topology configuration.
    pub topology: TopologyConfig,

    /// Per-collector probe settings.
    pub collectors: CollectorsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_collectors: DEFAULT_COLLECTORS.iter().map(|s| (*s).to_owned()).collect(),
            topology: TopologyConfig::default(),
            collectors: CollectorsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.as_ref().display(),
                    "Config file not found, using defaults"
                );
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse, expand `${VAR}` references, and validate.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.collectors.expand_env();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.web.socket_addr()?;

        let path = &self.web.telemetry_path;
        if !path.starts_with('/') || path == "/" || path == "/healthz" {
            return Err(ConfigError::ValidationError(format!(
                "invalid web telemetry_path: '{}'",
                path
            )));
        }

        if self.web.max_requests == 0 {
            return Err(ConfigError::ValidationError(
                "web max_requests must be positive".to_string(),
            ));
        }

        if !is_valid_metric_name(&self.namespace) {
            return Err(ConfigError::ValidationError(format!(
                "invalid namespace: '{}'",
                self.namespace
            )));
        }

        if self.default_collectors.is_empty() {
            return Err(ConfigError::ValidationError(
                "default_collectors cannot be empty".to_string(),
            ));
        }

        if self.topology.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "topology path cannot be empty".to_string(),
            ));
        }
        if self.topology.refresh == RefreshPolicy::Interval {
            ensure_non_zero("topology.refresh_interval", self.topology.refresh_interval)?;
        }

        self.collectors.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_CONFIG: &str = r#"
web:
  listen_address: "127.0.0.1:9250"
  telemetry_path: /swift-metrics
  max_requests: 4
namespace: swift_eu
default_collectors: [server, disk]
topology:
  path: /var/lib/swift_exporter/topology.json
  command: ["python3", "/usr/local/bin/update_swift_info.py"]
  refresh: interval
  refresh_interval: 10m
collectors:
  server:
    timeout: 1s
  disk:
    timeout: 5s
  proxy:
    container: exporter
    proxies: ["10.0.0.5:8080", "10.0.0.6:8080"]
    username: tester
    api_key: testing
    auth_url: http://10.0.0.5:8080/auth/v1.0
    payload_size: 1048576
"#;

    #[test]
    fn test_web_config_default() {
        let config = WebConfig::default();
        assert_eq!(config.listen_address, ":9150");
        assert_eq!(config.telemetry_path, "/metrics");
        assert_eq!(config.max_requests, DEFAULT_MAX_REQUESTS);
        assert_eq!(config.socket_addr().unwrap(), "0.0.0.0:9150".parse().unwrap());
    }

    #[test]
    fn test_socket_addr_forms() {
        let mut config = WebConfig {
            listen_address: "127.0.0.1:9150".to_string(),
            ..Default::default()
        };
        assert_eq!(config.socket_addr().unwrap().port(), 9150);

        config.listen_address = "[::1]:9150".to_string();
        assert!(config.socket_addr().unwrap().is_ipv6());

        config.listen_address = "not-an-address".to_string();
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_yaml(FULL_CONFIG).unwrap();
        assert_eq!(config.web.max_requests, 4);
        assert_eq!(config.namespace, "swift_eu");
        assert_eq!(config.default_collectors, ["server", "disk"]);
        assert_eq!(config.topology.refresh, RefreshPolicy::Interval);
        assert_eq!(config.topology.refresh_interval, Duration::from_secs(600));
        assert_eq!(config.topology.command.len(), 2);
        assert_eq!(config.collectors.server.timeout, Duration::from_secs(1));
        assert_eq!(config.collectors.proxy.endpoints().len(), 2);
        assert_eq!(config.collectors.proxy.payload_size, 1_048_576);
        assert_eq!(config.collectors.proxy.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.topology.path, PathBuf::from(DEFAULT_TOPOLOGY_PATH));
        assert_eq!(config.topology.refresh, RefreshPolicy::Startup);
        assert_eq!(config.default_collectors, ["server"]);
    }

    #[test]
    fn test_config_validation_invalid_telemetry_path() {
        for path in ["metrics", "/", "/healthz"] {
            let mut config = AppConfig::default();
            config.web.telemetry_path = path.to_string();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("telemetry_path"), "{path}");
        }
    }

    #[test]
    fn test_config_validation_invalid_values() {
        let mut config = AppConfig::default();
        config.web.max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.namespace = "swift-prod".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.default_collectors.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.topology.refresh = RefreshPolicy::Interval;
        config.topology.refresh_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_refresh_policy_rejected() {
        let err = AppConfig::from_yaml("topology:\n  refresh: sometimes\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_CONFIG.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.namespace, "swift_eu");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");

        assert!(matches!(AppConfig::load(&missing), Err(ConfigError::IoError(_))));
        assert_eq!(AppConfig::load_or_default(&missing).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_topology_source() {
        let config = AppConfig::from_yaml(FULL_CONFIG).unwrap();
        let source = config.topology.source();
        assert_eq!(source.path(), Path::new("/var/lib/swift_exporter/topology.json"));
    }
}

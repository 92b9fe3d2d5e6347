//! Collector configuration structures.

use serde::{Deserialize, Serialize};

use crate::collector::disk::DiskProbeConfig;
use crate::collector::proxy::ProxyProbeConfig;
use crate::collector::server::ServerProbeConfig;

use super::validation::{ConfigError, ensure_non_zero, expand_env_vars};

/// Probe settings grouped by collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    /// Reachability probe settings.
    pub server: ServerProbeConfig,

    /// Recon disk usage settings.
    pub disk: DiskProbeConfig,

    /// Write/delete probe settings.
    pub proxy: ProxyProbeConfig,
}

impl CollectorsConfig {
    /// Validate all collector configurations.
    ///
    /// Missing proxy `container`/`proxies` are not rejected here: the proxy
    /// collector reports them when it runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_non_zero("collectors.server.timeout", self.server.timeout)?;
        ensure_non_zero("collectors.disk.timeout", self.disk.timeout)?;
        ensure_non_zero("collectors.proxy.timeout", self.proxy.timeout)?;

        if self.proxy.payload_size == 0 {
            return Err(ConfigError::ValidationError(
                "collectors.proxy.payload_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand `${VAR}` references in the proxy settings.
    pub fn expand_env(&mut self) {
        let proxy = &mut self.proxy;
        let creds = &mut proxy.credentials;
        for value in [
            &mut proxy.container,
            &mut proxy.account,
            &mut creds.username,
            &mut creds.api_key,
            &mut creds.auth_url,
            &mut creds.domain,
            &mut creds.tenant,
        ] {
            *value = expand_env_vars(value);
        }
        for entry in &mut proxy.proxies {
            *entry = expand_env_vars(entry);
        }
    }
}

//! Topology snapshot types.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

/// Server role within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Account,
    Container,
    Object,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Container => "container",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account or container server address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerNode {
    #[serde(alias = "Host")]
    pub host: String,
    #[serde(alias = "Port", deserialize_with = "port_string")]
    pub port: String,
}

impl ServerNode {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }
}

/// Object server address with the devices it is expected to serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectNode {
    #[serde(alias = "Host")]
    pub host: String,
    #[serde(alias = "Port", deserialize_with = "port_string")]
    pub port: String,
    /// Device allow-list for disk usage reporting.
    #[serde(default, alias = "Devices")]
    pub devices: BTreeSet<String>,
}

impl ObjectNode {
    pub fn new<I, S>(host: impl Into<String>, port: impl Into<String>, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            host: host.into(),
            port: port.into(),
            devices: devices.into_iter().map(Into::into).collect(),
        }
    }
}

/// Immutable view of cluster members for one scrape.
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    #[serde(default, alias = "Account")]
    pub account: Vec<ServerNode>,
    #[serde(default, alias = "Container")]
    pub container: Vec<ServerNode>,
    #[serde(default, alias = "Object")]
    pub object: Vec<ObjectNode>,
}

impl TopologySnapshot {
    /// Parse the JSON document produced by the topology script.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Every server across all tiers as `(tier, host, port)`.
    pub fn servers(&self) -> impl Iterator<Item = (Tier, &str, &str)> {
        let account = self
            .account
            .iter()
            .map(|n| (Tier::Account, n.host.as_str(), n.port.as_str()));
        let container = self
            .container
            .iter()
            .map(|n| (Tier::Container, n.host.as_str(), n.port.as_str()));
        let object = self
            .object
            .iter()
            .map(|n| (Tier::Object, n.host.as_str(), n.port.as_str()));
        account.chain(container).chain(object)
    }

    /// Total number of servers across all tiers.
    pub fn server_count(&self) -> usize {
        self.account.len() + self.container.len() + self.object.len()
    }

    pub fn is_empty(&self) -> bool {
        self.server_count() == 0
    }
}

/// Accept ports written either as JSON strings or numbers.
fn port_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Text(s) => s,
        Port::Number(n) => n.to_string(),
    })
}

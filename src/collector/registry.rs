//! Collector registry mapping names to collector factories.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::collector::{Collector, CollectorError};
use crate::config::CollectorsConfig;

/// Collectors used when a scrape names none.
pub const DEFAULT_COLLECTORS: &[&str] = &["server"];

/// Settings handed to every factory.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Metric namespace prefix (e.g., "swift").
    pub namespace: String,
    /// Per-collector probe settings.
    pub collectors: CollectorsConfig,
}

/// Builds one collector instance.
pub type CollectorFactory =
    Box<dyn Fn(&CollectorSettings) -> Result<Arc<dyn Collector>, CollectorError> + Send + Sync>;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Requested collector name is not registered.
    #[error("missing collector: {0}")]
    Missing(String),

    /// Name registered twice.
    #[error("collector already registered: {0}")]
    Duplicate(String),

    /// Factory failed to build its collector.
    #[error("failed to create collector '{name}': {source}")]
    Factory {
        name: String,
        #[source]
        source: CollectorError,
    },
}

/// Collects registrations during start-up.
pub struct CollectorRegistryBuilder {
    settings: CollectorSettings,
    factories: BTreeMap<String, CollectorFactory>,
    defaults: Vec<String>,
}

impl CollectorRegistryBuilder {
    /// Register `factory` under `name`.
    ///
    /// # Errors
    /// Returns `RegistryError::Duplicate` if the name is taken.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Result<Self, RegistryError>
    where
        F: Fn(&CollectorSettings) -> Result<Arc<dyn Collector>, CollectorError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(self)
    }

    /// Replace the default collector set.
    pub fn default_collectors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defaults = names.into_iter().map(Into::into).collect();
        self
    }

    /// Freeze the registry.
    ///
    /// # Errors
    /// Returns `RegistryError::Missing` if a default collector is not registered.
    pub fn build(self) -> Result<CollectorRegistry, RegistryError> {
        if let Some(missing) = self
            .defaults
            .iter()
            .find(|name| !self.factories.contains_key(*name))
        {
            return Err(RegistryError::Missing(missing.clone()));
        }

        Ok(CollectorRegistry {
            settings: self.settings,
            factories: self.factories,
            defaults: self.defaults,
        })
    }
}

/// Immutable name → factory mapping.
///
/// Built once at start-up and shared without locking. Each scrape resolves
/// its own fresh collector instances.
pub struct CollectorRegistry {
    settings: CollectorSettings,
    factories: BTreeMap<String, CollectorFactory>,
    defaults: Vec<String>,
}

impl CollectorRegistry {
    /// Start building a registry.
    pub fn builder(settings: CollectorSettings) -> CollectorRegistryBuilder {
        CollectorRegistryBuilder {
            settings,
            factories: BTreeMap::new(),
            defaults: DEFAULT_COLLECTORS.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    /// Registered collector names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Names resolved when a scrape requests none.
    pub fn default_names(&self) -> &[String] {
        &self.defaults
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Instantiate the requested collectors.
    ///
    /// An empty request resolves the default set. Repeated names resolve to
    /// a single instance. Every name is checked before any factory runs, so
    /// an unknown name fails the whole resolution without side effects.
    ///
    /// # Errors
    /// `RegistryError::Missing` naming the first unregistered name, or
    /// `RegistryError::Factory` if a factory fails.
    pub fn resolve<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<Arc<dyn Collector>>, RegistryError> {
        let requested: Vec<&str> = if names.is_empty() {
            self.defaults.iter().map(String::as_str).collect()
        } else {
            names.iter().map(AsRef::as_ref).collect()
        };

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(requested.len());
        for name in requested {
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| RegistryError::Missing(name.to_owned()))?;
            if seen.insert(name) {
                unique.push((name, factory));
            }
        }

        let resolving: Vec<&str> = unique.iter().map(|(n, _)| *n).collect();
        tracing::debug!(collectors = ?resolving, "Resolving collectors");
        unique
            .into_iter()
            .map(|(name, factory)| {
                factory(&self.settings).map_err(|source| RegistryError::Factory {
                    name: name.to_owned(),
                    source,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("names", &self.names())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

//! Metric descriptors.

use std::sync::Arc;

/// Join metric name parts with underscores, skipping empty parts.
///
/// An empty `name` yields an empty string, mirroring Prometheus client
/// conventions.
///
/// ```
/// use swift_exporter::metrics::build_fq_name;
///
/// assert_eq!(build_fq_name("swift", "disk", "used_bytes"), "swift_disk_used_bytes");
/// assert_eq!(build_fq_name("swift", "", "put_status"), "swift_put_status");
/// ```
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    [namespace, subsystem, name]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Immutable description of one exported gauge family.
///
/// Collectors build their descriptors once at construction and hand out
/// `Arc` clones with every emitted sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricDesc {
    fq_name: String,
    help: String,
    labels: Vec<String>,
}

impl MetricDesc {
    /// Create a descriptor from its name parts, help text and label names.
    pub fn new(
        namespace: &str,
        subsystem: &str,
        name: &str,
        help: impl Into<String>,
        labels: &[&str],
    ) -> Arc<Self> {
        Arc::new(Self {
            fq_name: build_fq_name(namespace, subsystem, name),
            help: help.into(),
            labels: labels.iter().map(|l| (*l).to_owned()).collect(),
        })
    }

    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    /// Label names, in the order label values must be supplied.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl std::fmt::Display for MetricDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{{}}}", self.fq_name, self.labels.join(","))
    }
}

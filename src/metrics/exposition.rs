//! Prometheus text exposition of drained samples.

use std::collections::BTreeMap;
use std::sync::Arc;

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use super::{MetricDesc, Sample};

/// Content type of the rendered document.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Errors raised while rendering samples.
#[derive(Debug, Error)]
pub enum ExpositionError {
    /// Metric construction, registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Encoder produced invalid UTF-8.
    #[error("encoded metrics are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Render samples as a Prometheus text document.
///
/// Samples are grouped into one gauge family per descriptor name. Families
/// appear in name order; a family with no samples is omitted.
pub fn encode_text(samples: &[Sample]) -> Result<String, ExpositionError> {
    let mut families: BTreeMap<&str, (&Arc<MetricDesc>, Vec<&Sample>)> = BTreeMap::new();
    for sample in samples {
        families
            .entry(sample.desc.fq_name())
            .or_insert_with(|| (&sample.desc, Vec::new()))
            .1
            .push(sample);
    }

    let registry = Registry::new();
    for (name, (desc, members)) in families {
        let labels: Vec<&str> = desc.labels().iter().map(String::as_str).collect();
        let gauges = GaugeVec::new(Opts::new(name, desc.help()), &labels)?;

        for sample in members {
            if sample.desc != *desc {
                tracing::warn!(
                    metric = %sample.desc,
                    "Skipping sample with conflicting descriptor"
                );
                continue;
            }
            let values: Vec<&str> = sample.label_values.iter().map(String::as_str).collect();
            gauges.get_metric_with_label_values(&values)?.set(sample.value);
        }

        registry.register(Box::new(gauges))?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

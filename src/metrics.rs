//! Metrics Layer
//!
//! Format-agnostic plumbing between probes and the exposition endpoint.
//!
//! - [`MetricDesc`]: Name, help text and label schema of one metric family
//! - [`MetricSink`]: Clonable write handle probes emit [`Sample`]s into
//! - [`encode_text`]: Renders drained samples in the Prometheus text format

mod desc;
mod exposition;
mod sink;

pub use desc::{MetricDesc, build_fq_name};
pub use exposition::{CONTENT_TYPE, ExpositionError, encode_text};
pub use sink::{MetricSink, Sample, SampleReceiver};

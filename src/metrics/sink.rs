//! Sample sink shared by concurrently running probes.
//!
//! Many producers, one consumer: every probe task holds a [`MetricSink`]
//! clone, and the scrape coordinator drains the matching [`SampleReceiver`]
//! once all producers have joined.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::MetricDesc;

/// One measured value for a declared metric descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Descriptor the value belongs to.
    pub desc: Arc<MetricDesc>,
    /// Gauge value.
    pub value: f64,
    /// Label values, positionally matching `desc.labels()`.
    pub label_values: Vec<String>,
}

impl Sample {
    /// Look up a label value by label name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .labels()
            .iter()
            .position(|l| l == name)
            .and_then(|idx| self.label_values.get(idx))
            .map(String::as_str)
    }

    /// Fully-qualified metric name of this sample.
    pub fn name(&self) -> &str {
        self.desc.fq_name()
    }
}

/// Write-only handle for emitting samples.
#[derive(Debug, Clone)]
pub struct MetricSink {
    tx: mpsc::UnboundedSender<Sample>,
}

/// Consumer side of a [`MetricSink`].
#[derive(Debug)]
pub struct SampleReceiver {
    rx: mpsc::UnboundedReceiver<Sample>,
}

impl MetricSink {
    /// Create a connected sink/receiver pair.
    pub fn channel() -> (Self, SampleReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, SampleReceiver { rx })
    }

    /// Emit one sample.
    ///
    /// The number of label values must equal the descriptor's label count.
    /// Mismatching samples are dropped and logged, so no undeclared label
    /// ever reaches the exposition layer. Returns whether the sample was
    /// accepted.
    pub fn emit(&self, desc: &Arc<MetricDesc>, value: f64, label_values: &[&str]) -> bool {
        if label_values.len() != desc.labels().len() {
            tracing::error!(
                metric = %desc,
                expected = desc.labels().len(),
                got = label_values.len(),
                "Dropping sample with mismatched label values"
            );
            return false;
        }

        let sample = Sample {
            desc: Arc::clone(desc),
            value,
            label_values: label_values.iter().map(|v| (*v).to_owned()).collect(),
        };
        if self.tx.send(sample).is_err() {
            tracing::warn!(metric = %desc, "Sample receiver already drained");
            return false;
        }
        true
    }
}

impl SampleReceiver {
    /// Close the channel and collect every buffered sample.
    ///
    /// Call only after all producers have finished; anything emitted after
    /// this point is rejected by [`MetricSink::emit`].
    pub fn drain(mut self) -> Vec<Sample> {
        self.rx.close();
        let mut samples = Vec::new();
        while let Ok(sample) = self.rx.try_recv() {
            samples.push(sample);
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_desc() -> Arc<MetricDesc> {
        MetricDesc::new("swift", "server", "account_status", "reachability", &["host"])
    }

    #[test]
    fn test_emit_and_drain() {
        let (sink, rx) = MetricSink::channel();
        let desc = host_desc();

        assert!(sink.emit(&desc, 1.0, &["10.0.0.1"]));
        assert!(sink.clone().emit(&desc, 0.0, &["10.0.0.2"]));

        let samples = rx.drain();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label("host"), Some("10.0.0.1"));
        assert_eq!(samples[1].value, 0.0);
        assert_eq!(samples[1].name(), "swift_server_account_status");
    }

    #[test]
    fn test_emit_rejects_label_mismatch() {
        let (sink, rx) = MetricSink::channel();
        let desc = host_desc();

        assert!(!sink.emit(&desc, 1.0, &[]));
        assert!(!sink.emit(&desc, 1.0, &["10.0.0.1", "sda"]));
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_emit_after_drain_is_rejected() {
        let (sink, rx) = MetricSink::channel();
        let desc = host_desc();
        assert!(rx.drain().is_empty());
        assert!(!sink.emit(&desc, 1.0, &["10.0.0.1"]));
    }

    #[test]
    fn test_label_lookup_unknown_name() {
        let (sink, rx) = MetricSink::channel();
        sink.emit(&host_desc(), 1.0, &["10.0.0.1"]);
        let samples = rx.drain();
        assert_eq!(samples[0].label("device"), None);
    }
}

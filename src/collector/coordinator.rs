//! Scrape coordinator running a collector set concurrently.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::collector::{Collector, CollectorError, ScrapeContext};
use crate::metrics::{MetricDesc, MetricSink, Sample};

/// Runs one scrape cycle over a resolved collector set.
///
/// Each collector runs in its own task. Whatever its outcome, the
/// coordinator emits `<ns>_scrape_collector_duration_seconds` and
/// `<ns>_scrape_collector_success` for it, and does not return before every
/// collector task has joined.
#[derive(Debug, Clone)]
pub struct ScrapeCoordinator {
    duration_desc: Arc<MetricDesc>,
    success_desc: Arc<MetricDesc>,
}

impl ScrapeCoordinator {
    pub fn new(namespace: &str) -> Self {
        Self {
            duration_desc: MetricDesc::new(
                namespace,
                "scrape",
                "collector_duration_seconds",
                "swift_exporter: Duration of a collector scrape.",
                &["collector"],
            ),
            success_desc: MetricDesc::new(
                namespace,
                "scrape",
                "collector_success",
                "swift_exporter: Whether a collector succeeded.",
                &["collector"],
            ),
        }
    }

    /// Instrumentation descriptors owned by the coordinator.
    pub fn descriptors(&self) -> Vec<Arc<MetricDesc>> {
        vec![
            Arc::clone(&self.duration_desc),
            Arc::clone(&self.success_desc),
        ]
    }

    /// Run every collector concurrently and wait for all of them.
    ///
    /// Collector errors and panics are logged and reported as
    /// `collector_success 0`; they never abort sibling collectors.
    pub async fn collect(
        &self,
        collectors: Vec<Arc<dyn Collector>>,
        ctx: &ScrapeContext,
        sink: &MetricSink,
    ) {
        let mut tasks = JoinSet::new();
        for collector in collectors {
            tasks.spawn(execute(
                collector,
                ctx.clone(),
                sink.clone(),
                Arc::clone(&self.duration_desc),
                Arc::clone(&self.success_desc),
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Collector supervisor task failed");
            }
        }
    }

    /// Run a full scrape and return every emitted sample.
    pub async fn scrape(
        &self,
        collectors: Vec<Arc<dyn Collector>>,
        ctx: ScrapeContext,
    ) -> Vec<Sample> {
        let (sink, receiver) = MetricSink::channel();
        self.collect(collectors, &ctx, &sink).await;
        drop(sink);
        receiver.drain()
    }
}

/// Time one collector's update and record its outcome.
async fn execute(
    collector: Arc<dyn Collector>,
    ctx: ScrapeContext,
    sink: MetricSink,
    duration_desc: Arc<MetricDesc>,
    success_desc: Arc<MetricDesc>,
) {
    let name = collector.name().to_owned();
    tracing::debug!(collector = %name, "Running collector");

    let begin = Instant::now();
    // Inner task so a panic inside update() surfaces as a JoinError.
    let update_sink = sink.clone();
    let result = tokio::spawn(async move { collector.update(&ctx, &update_sink).await })
        .await
        .unwrap_or_else(|e| Err(CollectorError::Panicked(e.to_string())));
    let duration = begin.elapsed();

    let success = match &result {
        Ok(()) => {
            tracing::debug!(
                collector = %name,
                duration_ms = duration.as_millis(),
                "Collector succeeded"
            );
            1.0
        }
        Err(e) => {
            tracing::error!(collector = %name, error = %e, "Collector update failed");
            0.0
        }
    };

    sink.emit(&success_desc, success, &[name.as_str()]);
    sink.emit(&duration_desc, duration.as_secs_f64(), &[name.as_str()]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologySnapshot;
    use std::time::Duration;

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        Slow(Duration),
    }

    struct ScriptedCollector {
        name: &'static str,
        behavior: Behavior,
        desc: Arc<MetricDesc>,
    }

    impl ScriptedCollector {
        fn new(name: &'static str, behavior: Behavior) -> Arc<dyn Collector> {
            Arc::new(Self {
                name,
                behavior,
                desc: MetricDesc::new("test", name, "probe", "probe value", &[]),
            })
        }
    }

    #[async_trait::async_trait]
    impl Collector for ScriptedCollector {
        fn name(&self) -> &str {
            self.name
        }

        fn descriptors(&self) -> Vec<Arc<MetricDesc>> {
            vec![Arc::clone(&self.desc)]
        }

        async fn update(&self, _: &ScrapeContext, sink: &MetricSink) -> Result<(), CollectorError> {
            match self.behavior {
                Behavior::Succeed => {
                    sink.emit(&self.desc, 1.0, &[]);
                    Ok(())
                }
                Behavior::Fail => Err(CollectorError::Config("no container provided".to_string())),
                Behavior::Panic => panic!("probe exploded"),
                Behavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    sink.emit(&self.desc, 2.0, &[]);
                    Ok(())
                }
            }
        }
    }

    fn ctx() -> ScrapeContext {
        ScrapeContext::new(Arc::new(TopologySnapshot::default()))
    }

    fn value_for(samples: &[Sample], metric: &str, collector: &str) -> Option<f64> {
        samples
            .iter()
            .find(|s| s.name() == metric && s.label("collector") == Some(collector))
            .map(|s| s.value)
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_collector() {
        let coordinator = ScrapeCoordinator::new("swift");
        let samples = coordinator
            .scrape(
                vec![
                    ScriptedCollector::new("ok", Behavior::Succeed),
                    ScriptedCollector::new("broken", Behavior::Fail),
                    ScriptedCollector::new("crashing", Behavior::Panic),
                ],
                ctx(),
            )
            .await;

        let success = "swift_scrape_collector_success";
        assert_eq!(value_for(&samples, success, "ok"), Some(1.0));
        assert_eq!(value_for(&samples, success, "broken"), Some(0.0));
        assert_eq!(value_for(&samples, success, "crashing"), Some(0.0));
        assert!(samples.iter().any(|s| s.name() == "test_ok_probe"));

        let durations = samples
            .iter()
            .filter(|s| s.name() == "swift_scrape_collector_duration_seconds")
            .count();
        assert_eq!(durations, 3);
    }

    #[tokio::test]
    async fn test_scrape_waits_for_slow_collectors() {
        let coordinator = ScrapeCoordinator::new("swift");
        let samples = coordinator
            .scrape(
                vec![
                    ScriptedCollector::new("fast", Behavior::Succeed),
                    ScriptedCollector::new("slow", Behavior::Slow(Duration::from_millis(100))),
                ],
                ctx(),
            )
            .await;

        let slow = samples.iter().find(|s| s.name() == "test_slow_probe").unwrap();
        assert_eq!(slow.value, 2.0);

        let duration =
            value_for(&samples, "swift_scrape_collector_duration_seconds", "slow").unwrap();
        assert!(duration >= 0.1);
    }

    #[tokio::test]
    async fn test_empty_collector_set() {
        let coordinator = ScrapeCoordinator::new("swift");
        assert!(coordinator.scrape(Vec::new(), ctx()).await.is_empty());
        assert_eq!(coordinator.descriptors().len(), 2);
    }
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! One collection cycle: snapshot, enrich, fan out, close.

use tracing::{debug, warn};

use crate::error::CollectError;
use crate::labels::LabelResolver;
use crate::quantity::{Scale, scaled_value};
use crate::reporter::{Batch, Record, Reporter};
use crate::source::MetricsSource;

/// What a completed cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub pods: usize,
    pub containers: usize,
    /// Containers skipped because their usage could not be parsed.
    pub skipped_containers: usize,
    /// Batches whose close returned an error.
    pub failed_closes: usize,
}

/// Runs one collection cycle.
///
/// A failed snapshot aborts the cycle before any batch is opened. Otherwise
/// every reporter gets exactly one batch, which is closed even when the
/// snapshot is empty. Close failures are logged and counted, never returned.
pub async fn collect(
    source: &dyn MetricsSource,
    reporters: &[Box<dyn Reporter>],
    labels: &dyn LabelResolver,
    namespace: &str,
) -> Result<CycleSummary, CollectError> {
    let pods = source.list().await.map_err(CollectError::ListMetrics)?;

    let mut batches: Vec<(&str, Box<dyn Batch>)> = reporters
        .iter()
        .map(|reporter| (reporter.name(), reporter.start(namespace)))
        .collect();

    let mut summary = CycleSummary {
        pods: pods.len(),
        ..CycleSummary::default()
    };

    for pod in &pods {
        let pod_labels = labels.resolve(&pod.name);
        for container in &pod.containers {
            // same units as `kubectl top pods`
            let usage = scaled_value(&container.cpu, Scale::Milli)
                .and_then(|cpu| Ok((cpu, scaled_value(&container.memory, Scale::Mega)?)));
            let (cpu_millicores, memory_mbytes) = match usage {
                Ok(usage) => usage,
                Err(e) => {
                    warn!(
                        error = %e,
                        pod = %pod.name,
                        container = %container.name,
                        "Skipping container with unparseable usage"
                    );
                    summary.skipped_containers += 1;
                    continue;
                }
            };

            let record = Record {
                pod_name: &pod.name,
                container_name: &container.name,
                labels: &pod_labels,
                cpu_millicores,
                memory_mbytes,
            };
            for (_, batch) in batches.iter_mut() {
                batch.report(&record);
            }
            summary.containers += 1;
        }
    }

    for (name, batch) in batches {
        if let Err(e) = batch.close() {
            warn!(reporter = name, error = %e, "Failed to close batch");
            summary.failed_closes += 1;
        }
    }

    debug!(
        namespace,
        pods = summary.pods,
        containers = summary.containers,
        "Collection cycle complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    use super::*;
    use crate::error::{ReporterError, SourceError};
    use crate::labels::{DisabledLabels, LabelCache, LabelEvent, PodLabels};
    use crate::source::{ContainerUsage, PodUsage};

    struct StaticSource(Vec<PodUsage>);

    #[async_trait]
    impl MetricsSource for StaticSource {
        async fn list(&self) -> Result<Vec<PodUsage>, SourceError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Start(String),
        Report(String, String, PodLabels, i64, i64),
        Close,
    }

    #[derive(Default)]
    struct Recording {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Recording {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct RecordingReporter(Arc<Mutex<Vec<Call>>>);

    impl Reporter for RecordingReporter {
        fn name(&self) -> &str {
            "recording"
        }

        fn start(&self, namespace: &str) -> Box<dyn Batch> {
            self.0.lock().unwrap().push(Call::Start(namespace.to_string()));
            Box::new(RecordingBatch(Arc::clone(&self.0)))
        }
    }

    struct RecordingBatch(Arc<Mutex<Vec<Call>>>);

    impl Batch for RecordingBatch {
        fn report(&mut self, r: &Record<'_>) {
            self.0.lock().unwrap().push(Call::Report(
                r.pod_name.to_string(),
                r.container_name.to_string(),
                r.labels.clone(),
                r.cpu_millicores,
                r.memory_mbytes,
            ));
        }

        fn close(self: Box<Self>) -> Result<(), ReporterError> {
            self.0.lock().unwrap().push(Call::Close);
            Ok(())
        }
    }

    fn recording() -> (Recording, Box<dyn Reporter>) {
        let recording = Recording::default();
        let reporter = Box::new(RecordingReporter(Arc::clone(&recording.calls)));
        (recording, reporter)
    }

    fn container(name: &str, cpu: &str, memory: &str) -> ContainerUsage {
        ContainerUsage {
            name: name.to_string(),
            cpu: Quantity(cpu.to_string()),
            memory: Quantity(memory.to_string()),
        }
    }

    fn pod(name: &str, containers: Vec<ContainerUsage>) -> PodUsage {
        PodUsage {
            name: name.to_string(),
            containers,
        }
    }

    #[tokio::test]
    async fn test_reports_every_container_to_every_batch() {
        let source = StaticSource(vec![
            pod(
                "web-1",
                vec![
                    container("app", "100m", "50M"),
                    container("proxy", "0.25", "2000000"),
                ],
            ),
            pod("db-0", vec![container("postgres", "1", "1Gi")]),
        ]);
        let cache = LabelCache::new();
        cache.apply(LabelEvent::Applied {
            pod_name: "web-1".to_string(),
            labels: [("tier", "frontend")].into_iter().collect(),
        });
        let (first, first_reporter) = recording();
        let (second, second_reporter) = recording();
        let reporters = vec![first_reporter, second_reporter];

        let summary = collect(&source, &reporters, &cache, "prod").await.unwrap();

        assert_eq!(
            summary,
            CycleSummary {
                pods: 2,
                containers: 3,
                skipped_containers: 0,
                failed_closes: 0,
            }
        );
        let frontend: PodLabels = [("tier", "frontend")].into_iter().collect();
        let expected = vec![
            Call::Start("prod".to_string()),
            Call::Report("web-1".into(), "app".into(), frontend.clone(), 100, 50),
            Call::Report("web-1".into(), "proxy".into(), frontend, 250, 2),
            Call::Report("db-0".into(), "postgres".into(), PodLabels::empty(), 1000, 1074),
            Call::Close,
        ];
        assert_eq!(first.calls(), expected);
        assert_eq!(second.calls(), expected);
    }

    #[tokio::test]
    async fn test_empty_snapshot_still_opens_and_closes() {
        let (recording, reporter) = recording();

        let summary = collect(&StaticSource(vec![]), &[reporter], &DisabledLabels, "prod")
            .await
            .unwrap();

        assert_eq!(summary.pods, 0);
        assert_eq!(
            recording.calls(),
            vec![Call::Start("prod".to_string()), Call::Close]
        );
    }

    #[tokio::test]
    async fn test_unparseable_container_is_skipped() {
        let source = StaticSource(vec![pod(
            "web-1",
            vec![container("bad", "lots", "1M"), container("good", "1m", "1M")],
        )]);
        let (recording, reporter) = recording();

        let summary = collect(&source, &[reporter], &DisabledLabels, "prod")
            .await
            .unwrap();

        assert_eq!(summary.containers, 1);
        assert_eq!(summary.skipped_containers, 1);
        assert_eq!(recording.calls().len(), 3);
    }
}

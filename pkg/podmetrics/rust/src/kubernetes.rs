// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Kubernetes API adapters: the pod label watch and the PodMetrics listing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::SourceError;
use crate::labels::{LabelEvent, PodLabels};
use crate::source::{ContainerUsage, MetricsSource, PodUsage};

/// Label events for every pod in `namespace`.
///
/// Starts with a full listing and follows with incremental changes. Watch
/// failures are yielded as errors and retried with backoff.
pub fn pod_label_events(
    client: Client,
    namespace: &str,
) -> impl Stream<Item = Result<LabelEvent, watcher::Error>> + Send + use<> {
    let pods: Api<Pod> = Api::namespaced(client, namespace);
    watcher::watcher(pods, watcher::Config::default())
        .default_backoff()
        .filter_map(|event| futures::future::ready(event.map(label_event).transpose()))
}

fn label_event(event: Event<Pod>) -> Option<LabelEvent> {
    match event {
        Event::Apply(pod) => {
            named_labels(pod).map(|(pod_name, labels)| LabelEvent::Applied { pod_name, labels })
        }
        Event::InitApply(pod) => named_labels(pod)
            .map(|(pod_name, labels)| LabelEvent::RelistApplied { pod_name, labels }),
        Event::Delete(pod) => pod
            .metadata
            .name
            .map(|pod_name| LabelEvent::Deleted { pod_name }),
        Event::Init => Some(LabelEvent::RelistStarted),
        Event::InitDone => Some(LabelEvent::RelistDone),
    }
}

fn named_labels(pod: Pod) -> Option<(String, PodLabels)> {
    let name = pod.metadata.name?;
    let labels = pod.metadata.labels.unwrap_or_default();
    Some((name, PodLabels::new(labels)))
}

/// Lists `metrics.k8s.io/v1beta1` pod metrics for one namespace.
pub struct PodMetricsSource {
    api: Api<DynamicObject>,
    namespace: String,
}

impl PodMetricsSource {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced_with(client, namespace, &pod_metrics_resource()),
            namespace: namespace.to_string(),
        }
    }
}

fn pod_metrics_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
    ApiResource::from_gvk_with_plural(&gvk, "pods")
}

#[derive(Debug, Deserialize)]
struct ContainerMetrics {
    name: String,
    #[serde(default)]
    usage: BTreeMap<String, Quantity>,
}

#[async_trait]
impl MetricsSource for PodMetricsSource {
    async fn list(&self) -> Result<Vec<PodUsage>, SourceError> {
        let list = self.api.list(&ListParams::default()).await?;
        debug!(namespace = %self.namespace, pods = list.items.len(), "Listed pod metrics");
        list.items.into_iter().filter_map(pod_usage).collect()
    }
}

fn pod_usage(object: DynamicObject) -> Option<Result<PodUsage, SourceError>> {
    let name = object.metadata.name?;
    let containers = match object.data.get("containers") {
        Some(containers) => match Vec::<ContainerMetrics>::deserialize(containers) {
            Ok(containers) => containers,
            Err(source) => return Some(Err(SourceError::Decode { pod: name, source })),
        },
        None => Vec::new(),
    };

    let containers = containers
        .into_iter()
        .map(|mut c| ContainerUsage {
            cpu: c.usage.remove("cpu").unwrap_or_else(zero),
            memory: c.usage.remove("memory").unwrap_or_else(zero),
            name: c.name,
        })
        .collect();

    Some(Ok(PodUsage { name, containers }))
}

fn zero() -> Quantity {
    Quantity("0".to_string())
}

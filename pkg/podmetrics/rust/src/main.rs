// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use kube::Client;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;

use pod_metrics_reporter::collect::collect;
use pod_metrics_reporter::config::{Args, build_reporters};
use pod_metrics_reporter::kubernetes::{PodMetricsSource, pod_label_events};
use pod_metrics_reporter::labels::{DisabledLabels, INITIAL_SYNC_GRACE, LabelCache, LabelResolver};
use pod_metrics_reporter::reporter::Reporter;
use pod_metrics_reporter::source::MetricsSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG takes precedence over --debug
    let default_filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!(
        namespace = %args.namespace,
        include_labels = args.include_labels,
        telegraf_endpoint = args.telegraf_endpoint.as_deref().unwrap_or(""),
        "Starting pod-metrics-reporter"
    );

    run(args).await
}

async fn run(args: Args) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .context("Failed to load Kubernetes client configuration")?;

    let mut label_watch = None;
    let labels: Box<dyn LabelResolver> = if args.include_labels {
        let events = pod_label_events(client.clone(), &args.namespace);
        let (cache, handle) = LabelCache::start(events, INITIAL_SYNC_GRACE).await;
        label_watch = Some(handle);
        Box::new(cache)
    } else {
        Box::new(DisabledLabels)
    };

    let source = PodMetricsSource::new(client, &args.namespace);
    let reporters = build_reporters(&args).context("Failed to create reporters")?;

    let Some(interval) = args.effective_interval() else {
        return run_cycle(&source, &reporters, labels.as_ref(), &args.namespace).await;
    };

    tracing::info!(interval_ms = interval.as_millis() as u64, "Collecting periodically");
    collect_forever(
        &source,
        &reporters,
        labels.as_ref(),
        label_watch,
        &args.namespace,
        interval,
    )
    .await
}

/// Runs cycles back to back with `interval` between them until a signal
/// arrives. Any cycle failure ends the process, since it usually means the
/// metrics API is missing or forbidden rather than briefly unavailable.
async fn collect_forever(
    source: &PodMetricsSource,
    reporters: &[Box<dyn Reporter>],
    labels: &dyn LabelResolver,
    label_watch: Option<JoinHandle<()>>,
    namespace: &str,
    interval: Duration,
) -> anyhow::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        if label_watch.as_ref().is_some_and(JoinHandle::is_finished) {
            bail!("Pod label watch stopped");
        }

        run_cycle(source, reporters, labels, namespace).await?;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down");
                return Ok(());
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
                return Ok(());
            }
        }
    }
}

async fn run_cycle(
    source: &dyn MetricsSource,
    reporters: &[Box<dyn Reporter>],
    labels: &dyn LabelResolver,
    namespace: &str,
) -> anyhow::Result<()> {
    let summary = collect(source, reporters, labels, namespace)
        .await
        .context("Collection failed")?;
    tracing::debug!(
        pods = summary.pods,
        containers = summary.containers,
        failed_closes = summary.failed_closes,
        "Cycle finished"
    );
    Ok(())
}

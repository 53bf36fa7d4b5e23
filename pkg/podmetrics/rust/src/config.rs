// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Command line and environment configuration.

use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::error::ClientError;
use crate::reporter::{ConsoleReporter, LineProtocolReporter, Reporter};

/// Collection interval used with a network sink when none is given.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Reports per-container CPU and memory usage of the pods in a namespace
#[derive(Parser, Debug, Clone)]
#[command(name = "pod-metrics-reporter")]
pub struct Args {
    /// The namespace of the pods to collect
    #[arg(long, env = "NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// The interval of metrics collection, e.g. `30s`, `1m30s`, `500ms`
    ///
    /// When zero or unset, a single collection is performed unless a
    /// telegraf endpoint is configured.
    #[arg(long, env = "INTERVAL", value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// Include pod labels in reported metrics
    #[arg(long, env = "INCLUDE_LABELS")]
    pub include_labels: bool,

    /// Enable debug logging
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// If configured, metrics are sent as line protocol to this telegraf
    /// endpoint (`host:port`, `tcp://host:port` or `udp://host:port`)
    #[arg(long, env = "TELEGRAF_ENDPOINT")]
    pub telegraf_endpoint: Option<String>,
}

impl Args {
    /// The interval between cycles, or `None` for a single collection.
    pub fn effective_interval(&self) -> Option<Duration> {
        match self.interval.filter(|interval| !interval.is_zero()) {
            Some(interval) => Some(interval),
            None if self.telegraf_endpoint.is_some() => Some(DEFAULT_INTERVAL),
            None => None,
        }
    }
}

/// Builds the configured reporters. The console reporter is used when no
/// other reporter is configured, so the result is never empty.
pub fn build_reporters(args: &Args) -> Result<Vec<Box<dyn Reporter>>, ClientError> {
    let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();

    if let Some(endpoint) = &args.telegraf_endpoint {
        reporters.push(Box::new(LineProtocolReporter::connect(endpoint)?));
        info!(endpoint = %endpoint, "Reporting metrics to telegraf");
    }

    if reporters.is_empty() {
        reporters.push(Box::new(ConsoleReporter::stdout()));
    }
    Ok(reporters)
}

/// Parses a human readable duration such as `1m30s` or `500ms`; a bare
/// number is taken as seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(value).map_err(|e| format!("invalid duration {value:?}: {e}"))
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Destinations for enriched container usage.
//!
//! A [`Reporter`] is built once at startup. Every collection cycle asks each
//! reporter for a [`Batch`], feeds it one [`Record`] per container and closes
//! it exactly once.

mod console;
mod line_protocol;

pub use console::ConsoleReporter;
pub use line_protocol::{LineProtocolReporter, MEASUREMENT};

use crate::error::ReporterError;
use crate::labels::PodLabels;

/// Usage of one container enriched with its pod's labels.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub pod_name: &'a str,
    pub container_name: &'a str,
    pub labels: &'a PodLabels,
    pub cpu_millicores: i64,
    pub memory_mbytes: i64,
}

pub trait Reporter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Opens the batch for one cycle. Must be cheap and infallible.
    fn start(&self, namespace: &str) -> Box<dyn Batch>;
}

/// One reporter's participation in a single cycle.
pub trait Batch: Send {
    /// Accepts one record. Delivery problems are never surfaced here.
    fn report(&mut self, record: &Record<'_>);

    /// Flushes buffered work and releases the batch.
    fn close(self: Box<Self>) -> Result<(), ReporterError>;
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::io;

use thiserror::Error;

/// Failure to obtain a usage snapshot from the metrics API.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to list pod metrics: {0}")]
    List(#[from] kube::Error),
    #[error("malformed pod metrics for {pod}: {source}")]
    Decode {
        pod: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that abort a collection cycle.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("failed to list kube metrics: {0}")]
    ListMetrics(#[source] SourceError),
}

#[derive(Error, Debug)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid quantity {0:?}")]
    Invalid(String),
}

/// Failure while closing a reporter batch.
#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("failed to write batch: {0}")]
    Io(#[from] io::Error),
    #[error("line protocol client is shut down")]
    ClientClosed,
}

/// Errors surfaced by the line-protocol client, mostly through its error listener.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: &'static str },
    #[error("point {measurement:?} has no fields")]
    NoFields { measurement: String },
    #[error("send queue is full, dropped point")]
    QueueFull,
    #[error("client is shut down")]
    Closed,
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to send {points} points to {endpoint}: {source}")]
    Send {
        endpoint: String,
        points: usize,
        #[source]
        source: io::Error,
    },
}

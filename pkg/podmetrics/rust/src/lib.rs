// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Per-container pod usage reporting.
//!
//! Samples CPU and memory usage of every container in a namespace from the
//! Kubernetes metrics API and forwards one record per container to each
//! configured reporter.
//!
//! ## Architecture
//!
//! 1. **Label cache** (`labels` module) - Keeps pod labels current from a pod
//!    watch running on a background task, so lookups never wait on the API.
//!
//! 2. **Collection cycle** (`collect` module) - Takes a usage snapshot,
//!    rescales it to millicores and megabytes, enriches it with labels and
//!    fans every record out to one batch per reporter.
//!
//! 3. **Reporters** (`reporter` module) - A console reporter, and a
//!    line-protocol reporter backed by an asynchronous batching client
//!    (`line_protocol` module).
//!
//! ## Usage
//!
//! ```bash
//! pod-metrics-reporter \
//!   --namespace prod \
//!   --include-labels \
//!   --telegraf-endpoint telegraf:8094 \
//!   --interval 1m
//! ```

pub mod collect;
pub mod config;
pub mod error;
pub mod kubernetes;
pub mod labels;
pub mod line_protocol;
pub mod quantity;
pub mod reporter;
pub mod source;

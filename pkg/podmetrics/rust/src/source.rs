// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Point-in-time usage snapshots.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::SourceError;

/// Raw usage of one container, in metrics API units (cores, bytes).
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerUsage {
    pub name: String,
    pub cpu: Quantity,
    pub memory: Quantity,
}

/// Usage of every container of one pod.
#[derive(Debug, Clone, PartialEq)]
pub struct PodUsage {
    pub name: String,
    pub containers: Vec<ContainerUsage>,
}

/// Returns the current usage snapshot on demand.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn list(&self) -> Result<Vec<PodUsage>, SourceError>;
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use super::{Batch, Record, Reporter};
use crate::error::{ClientError, ReporterError};
use crate::line_protocol::{ClientConfig, LineProtocolClient, Point};

pub const MEASUREMENT: &str = "kubernetes_pod_container";

/// Sends one point per record through a shared [`LineProtocolClient`], e.g. to
/// a telegraf `socket_listener` input.
pub struct LineProtocolReporter {
    client: LineProtocolClient,
}

impl LineProtocolReporter {
    pub fn new(client: LineProtocolClient) -> Self {
        Self { client }
    }

    /// Builds a client for `endpoint` whose delivery errors are logged.
    pub fn connect(endpoint: &str) -> Result<Self, ClientError> {
        let config = ClientConfig::new(endpoint).with_error_listener(|e| {
            error!(error = %e, "Failed to send metrics");
        });
        LineProtocolClient::new(config).map(Self::new)
    }
}

impl Reporter for LineProtocolReporter {
    fn name(&self) -> &str {
        "line_protocol"
    }

    fn start(&self, namespace: &str) -> Box<dyn Batch> {
        Box::new(LineProtocolBatch {
            client: self.client.clone(),
            timestamp: Utc::now(),
            namespace: namespace.to_string(),
            records: 0,
        })
    }
}

struct LineProtocolBatch {
    client: LineProtocolClient,
    timestamp: DateTime<Utc>,
    namespace: String,
    records: usize,
}

impl Batch for LineProtocolBatch {
    fn report(&mut self, record: &Record<'_>) {
        self.records += 1;
        self.client
            .send(record_point(self.timestamp, &self.namespace, record));
    }

    fn close(self: Box<Self>) -> Result<(), ReporterError> {
        self.client
            .flush()
            .map_err(|_| ReporterError::ClientClosed)?;
        debug!(
            namespace = %self.namespace,
            records = self.records,
            "Line protocol batch flushed"
        );
        Ok(())
    }
}

fn record_point(timestamp: DateTime<Utc>, namespace: &str, record: &Record<'_>) -> Point {
    let mut point = Point::new(MEASUREMENT);
    point
        .set_time(timestamp)
        .add_tag("namespace", namespace)
        .add_tag("pod_name", record.pod_name)
        .add_tag("container_name", record.container_name);
    for (key, value) in record.labels.iter() {
        point.add_tag(format!("label_{key}"), value);
    }
    point
        .add_field("cpu_usage_millicores", record.cpu_millicores)
        .add_field("memory_usage_mbytes", record.memory_mbytes);
    point
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;
    use crate::labels::PodLabels;
    use crate::line_protocol::FieldValue;

    #[test]
    fn test_record_point_tags_and_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let labels: PodLabels = [("tier", "frontend"), ("app", "shop")].into_iter().collect();
        let record = Record {
            pod_name: "web-1",
            container_name: "app",
            labels: &labels,
            cpu_millicores: 100,
            memory_mbytes: 50,
        };

        let point = record_point(ts, "prod", &record);

        assert_eq!(point.measurement(), MEASUREMENT);
        assert_eq!(point.tag("namespace"), Some("prod"));
        assert_eq!(point.tag("pod_name"), Some("web-1"));
        assert_eq!(point.tag("container_name"), Some("app"));
        assert_eq!(point.tag("label_tier"), Some("frontend"));
        assert_eq!(point.tag("label_app"), Some("shop"));
        assert_eq!(point.field("cpu_usage_millicores"), Some(&FieldValue::Integer(100)));
        assert_eq!(point.field("memory_usage_mbytes"), Some(&FieldValue::Integer(50)));
    }

    #[tokio::test]
    async fn test_batch_close_flushes_shared_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = LineProtocolClient::new(ClientConfig {
            batch_timeout: Duration::from_secs(3600),
            ..ClientConfig::new(listener.local_addr().unwrap().to_string())
        })
        .unwrap();
        let reporter = LineProtocolReporter::new(client);
        let labels = PodLabels::empty();

        let mut batch = reporter.start("default");
        batch.report(&Record {
            pod_name: "web-1",
            container_name: "app",
            labels: &labels,
            cpu_millicores: 100,
            memory_mbytes: 50,
        });
        batch.close().unwrap();

        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let line = tokio::time::timeout(
            Duration::from_secs(5),
            BufReader::new(stream).lines().next_line(),
        )
        .await
        .unwrap()
        .unwrap()
        .unwrap();

        let (head, timestamp) = line.rsplit_once(' ').unwrap();
        assert_eq!(
            head,
            "kubernetes_pod_container,container_name=app,namespace=default,pod_name=web-1 \
             cpu_usage_millicores=100i,memory_usage_mbytes=50i"
        );
        assert!(timestamp.parse::<i64>().is_ok());
    }
}

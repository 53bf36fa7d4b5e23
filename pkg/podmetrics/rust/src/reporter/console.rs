// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use super::{Batch, Record, Reporter};
use crate::error::ReporterError;

/// Written after the last record of every batch.
const SEPARATOR: &str = "---";

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Prints one human-readable line per record, `kubectl top` style.
pub struct ConsoleReporter {
    out: SharedWriter,
}

impl ConsoleReporter {
    pub fn new<W: Write + Send + 'static>(out: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Reporter for ConsoleReporter {
    fn name(&self) -> &str {
        "console"
    }

    fn start(&self, namespace: &str) -> Box<dyn Batch> {
        Box::new(ConsoleBatch {
            out: Arc::clone(&self.out),
            timestamp: Utc::now(),
            namespace: namespace.to_string(),
            records: 0,
        })
    }
}

struct ConsoleBatch {
    out: SharedWriter,
    timestamp: DateTime<Utc>,
    namespace: String,
    records: usize,
}

impl ConsoleBatch {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")?;
        out.flush()
    }
}

impl Batch for ConsoleBatch {
    fn report(&mut self, record: &Record<'_>) {
        self.records += 1;
        if let Err(e) = self.write_line(&format_record(&self.timestamp, record)) {
            warn!(error = %e, pod = record.pod_name, "Failed to print record");
        }
    }

    fn close(self: Box<Self>) -> Result<(), ReporterError> {
        self.write_line(SEPARATOR)?;
        debug!(
            namespace = %self.namespace,
            records = self.records,
            "Console batch closed"
        );
        Ok(())
    }
}

/// `<RFC3339> pod=<pod>, container=<container>,[ label:<k>=<v>[, ...]] cpu=<N>m, mem=<N>Mi`
fn format_record(timestamp: &DateTime<Utc>, record: &Record<'_>) -> String {
    let mut labels = String::new();
    for (i, (key, value)) in record.labels.iter().enumerate() {
        labels.push_str(if i == 0 { " " } else { ", " });
        let _ = write!(labels, "label:{key}={value}");
    }

    format!(
        "{} pod={}, container={},{} cpu={}m, mem={}Mi",
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        record.pod_name,
        record.container_name,
        labels,
        record.cpu_millicores,
        record.memory_mbytes,
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::labels::PodLabels;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn record<'a>(labels: &'a PodLabels) -> Record<'a> {
        Record {
            pod_name: "web-1",
            container_name: "app",
            labels,
            cpu_millicores: 100,
            memory_mbytes: 50,
        }
    }

    #[test]
    fn test_format_without_labels() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let labels = PodLabels::empty();
        assert_eq!(
            format_record(&ts, &record(&labels)),
            "2024-05-01T12:30:00Z pod=web-1, container=app, cpu=100m, mem=50Mi"
        );
    }

    #[test]
    fn test_format_with_labels_in_key_order() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let labels: PodLabels = [("tier", "frontend"), ("app", "shop")].into_iter().collect();
        assert_eq!(
            format_record(&ts, &record(&labels)),
            "2024-05-01T12:30:00Z pod=web-1, container=app, label:app=shop, label:tier=frontend cpu=100m, mem=50Mi"
        );
    }

    #[test]
    fn test_batch_prints_records_then_separator() {
        let buffer = SharedBuffer::default();
        let reporter = ConsoleReporter::new(buffer.clone());
        let labels: PodLabels = [("tier", "frontend")].into_iter().collect();

        let mut batch = reporter.start("default");
        batch.report(&record(&labels));
        batch.close().unwrap();

        let output = buffer.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(
            lines[0].ends_with("pod=web-1, container=app, label:tier=frontend cpu=100m, mem=50Mi")
        );
        assert_eq!(lines[1], "---");
    }

    #[test]
    fn test_empty_batch_still_prints_separator() {
        let buffer = SharedBuffer::default();
        let reporter = ConsoleReporter::new(buffer.clone());

        reporter.start("default").close().unwrap();

        assert_eq!(buffer.contents(), "---\n");
    }

    #[test]
    fn test_write_failures_surface_on_close_only() {
        let reporter = ConsoleReporter::new(BrokenPipe);
        let labels = PodLabels::empty();

        let mut batch = reporter.start("default");
        batch.report(&record(&labels));
        assert!(matches!(batch.close(), Err(ReporterError::Io(_))));
    }
}

use crate::source::SourceKind;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

/// Instruments recorded by the scan controller. Without an installed meter
/// provider every instrument is a no-op.
pub struct ScanMetrics {
    request_duration: Histogram<f64>,
    captures: Counter<u64>,
    failures: Counter<u64>,
}

/// What went wrong, as the `kind` attribute of `scan_failures_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Analysis,
    Search,
    Camera,
    Capture,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Analysis => "analysis",
            FailureKind::Search => "search",
            FailureKind::Camera => "camera",
            FailureKind::Capture => "capture",
        }
    }
}

impl ScanMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.05, 0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 5.0, 7.5, 10.0, 15.0, 30.0,
        ];
        let request_duration = meter
            .f64_histogram("scan_request_duration_seconds")
            .with_description("Round trip of a recognition request (analyze or search)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let captures = meter
            .u64_counter("scan_captures_total")
            .with_description("Images accepted as the scan subject")
            .build();
        let failures = meter
            .u64_counter("scan_failures_total")
            .with_description("Failures surfaced to the user")
            .build();

        Self {
            request_duration,
            captures,
            failures,
        }
    }

    pub fn record_request(&self, operation: &'static str, elapsed: Duration, ok: bool) {
        self.request_duration.record(
            elapsed.as_secs_f64(),
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("outcome", if ok { "ok" } else { "error" }),
            ],
        );
    }

    pub fn record_capture(&self, source: SourceKind) {
        self.captures.add(1, &[KeyValue::new("source", source.as_str())]);
    }

    pub fn record_failure(&self, kind: FailureKind) {
        self.failures.add(1, &[KeyValue::new("kind", kind.as_str())]);
    }
}

use crate::types::ExtractionWarning;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic request counters plus a latency histogram. The counters are
/// the only process-wide mutable state besides the model slot; everything
/// here is lock-free or held for microseconds.
pub struct Telemetry {
    requests: AtomicU64,
    rejected: AtomicU64,
    degraded: AtomicU64,
    model_swaps: AtomicU64,
    latency_us: Mutex<Histogram<u64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub total_requests: u64,
    pub rejected_requests: u64,
    /// Requests that completed with at least one extraction warning.
    pub degraded_requests: u64,
    pub model_swaps: u64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            model_swaps: AtomicU64::new(0),
            latency_us: Mutex::new(Histogram::new(3).expect("histogram sigfigs")),
        }
    }

    pub fn observe_request(&self, latency: Duration, warnings: &[ExtractionWarning]) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !warnings.is_empty() {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
        let mut histogram = self.latency_us.lock();
        let _ = histogram.record(latency.as_micros() as u64);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_swap(&self) {
        self.model_swaps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let histogram = self.latency_us.lock();
        TelemetrySnapshot {
            total_requests: self.requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected.load(Ordering::Relaxed),
            degraded_requests: self.degraded.load(Ordering::Relaxed),
            model_swaps: self.model_swaps.load(Ordering::Relaxed),
            p50_latency_ms: histogram.value_at_quantile(0.50) as f64 / 1000.0,
            p95_latency_ms: histogram.value_at_quantile(0.95) as f64 / 1000.0,
            p99_latency_ms: histogram.value_at_quantile(0.99) as f64 / 1000.0,
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_outcomes() {
        let telemetry = Telemetry::new();
        telemetry.observe_request(Duration::from_millis(2), &[]);
        telemetry.observe_request(
            Duration::from_millis(3),
            &[ExtractionWarning::DnsLookupTimeout],
        );
        telemetry.record_rejected();
        telemetry.record_model_swap();

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.degraded_requests, 1);
        assert_eq!(snapshot.rejected_requests, 1);
        assert_eq!(snapshot.model_swaps, 1);
        assert!(snapshot.p50_latency_ms >= 0.0);
        assert!(snapshot.p99_latency_ms >= snapshot.p50_latency_ms);
    }

    #[test]
    fn empty_snapshot_is_zeroed() {
        let snapshot = Telemetry::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.p95_latency_ms, 0.0);
    }
}

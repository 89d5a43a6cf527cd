//! Metrics collection for simulation runs.

use callbridge_client::CorrelatorStats;
use hdrhistogram::Histogram;
use std::time::Duration;

/// Highest latency tracked with full precision, in microseconds.
const MAX_TRACKED_MICROS: u64 = 60_000_000;

/// Latency percentiles for one kind of operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: u64,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub max: Duration,
}

impl LatencySummary {
    fn from_histogram(histogram: &Histogram<u64>) -> Self {
        if histogram.is_empty() {
            return Self::default();
        }
        Self {
            count: histogram.len(),
            p50: Duration::from_micros(histogram.value_at_quantile(0.50)),
            p90: Duration::from_micros(histogram.value_at_quantile(0.90)),
            p99: Duration::from_micros(histogram.value_at_quantile(0.99)),
            max: Duration::from_micros(histogram.max()),
        }
    }
}

/// Collects outcomes while a run is in progress.
#[derive(Debug)]
pub struct MetricsCollector {
    /// Dispatch to settled result.
    request_latency: Histogram<u64>,
    /// Time between consecutive events of one subscription.
    event_gap: Histogram<u64>,
    requests_completed: u64,
    requests_failed: u64,
    /// Responses that resolved the wrong request.
    mismatched: u64,
    events_received: u64,
    stream_errors: u64,
}

impl MetricsCollector {
    /// Create an empty collector.
    pub fn new() -> Result<Self, hdrhistogram::CreationError> {
        Ok(Self {
            request_latency: Histogram::new_with_bounds(1, MAX_TRACKED_MICROS, 3)?,
            event_gap: Histogram::new_with_bounds(1, MAX_TRACKED_MICROS, 3)?,
            requests_completed: 0,
            requests_failed: 0,
            mismatched: 0,
            events_received: 0,
            stream_errors: 0,
        })
    }

    /// Record a settled single-shot request.
    pub fn record_request(&mut self, latency: Duration, matched: bool) {
        self.request_latency.saturating_record(as_micros(latency));
        self.requests_completed += 1;
        if !matched {
            self.mismatched += 1;
        }
    }

    /// Record a request that settled with an error.
    pub fn record_request_failure(&mut self) {
        self.requests_failed += 1;
    }

    /// Record one streamed event.
    pub fn record_event(&mut self, gap: Duration) {
        self.event_gap.saturating_record(as_micros(gap));
        self.events_received += 1;
    }

    /// Record a stream that ended with an error.
    pub fn record_stream_error(&mut self) {
        self.stream_errors += 1;
    }

    /// Finish collection.
    pub fn report(&self, elapsed: Duration, correlator: CorrelatorStats) -> SimulationReport {
        SimulationReport {
            elapsed,
            requests_completed: self.requests_completed,
            requests_failed: self.requests_failed,
            mismatched: self.mismatched,
            events_received: self.events_received,
            stream_errors: self.stream_errors,
            request_latency: LatencySummary::from_histogram(&self.request_latency),
            event_gap: LatencySummary::from_histogram(&self.event_gap),
            correlator,
        }
    }
}

fn as_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX).max(1)
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub elapsed: Duration,
    pub requests_completed: u64,
    pub requests_failed: u64,
    pub mismatched: u64,
    pub events_received: u64,
    pub stream_errors: u64,
    pub request_latency: LatencySummary,
    pub event_gap: LatencySummary,
    /// Correlator counters at the end of the run.
    pub correlator: CorrelatorStats,
}

impl SimulationReport {
    /// Settled requests and events per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.requests_completed + self.requests_failed + self.events_received) as f64 / secs
        } else {
            0.0
        }
    }

    /// Check if every response reached the request it belonged to.
    pub fn is_clean(&self) -> bool {
        self.mismatched == 0
            && self.requests_failed == 0
            && self.stream_errors == 0
            && self.correlator.protocol_violations == 0
    }

    /// Print a human readable summary to stdout.
    pub fn print(&self) {
        println!("Simulation finished in {:?}", self.elapsed);
        println!(
            "  requests: {} ok, {} failed, {} mismatched",
            self.requests_completed, self.requests_failed, self.mismatched
        );
        println!(
            "  latency:  p50 {:?}  p90 {:?}  p99 {:?}  max {:?}",
            self.request_latency.p50,
            self.request_latency.p90,
            self.request_latency.p99,
            self.request_latency.max
        );
        println!(
            "  events:   {} received, {} stream errors, p99 gap {:?}",
            self.events_received, self.stream_errors, self.event_gap.p99
        );
        println!(
            "  correlator: {} dispatched, {} resolved, {} rejected, {} late callbacks, {} violations",
            self.correlator.dispatched,
            self.correlator.resolved,
            self.correlator.rejected,
            self.correlator.late_callbacks,
            self.correlator.protocol_violations
        );
        println!("  throughput: {:.1} ops/s", self.throughput());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles() {
        let mut metrics = MetricsCollector::new().unwrap();
        for ms in 1..=100u64 {
            metrics.record_request(Duration::from_millis(ms), true);
        }
        metrics.record_request(Duration::from_millis(5), false);
        metrics.record_request_failure();

        let report = metrics.report(Duration::from_secs(1), CorrelatorStats::default());
        assert_eq!(report.request_latency.count, 101);
        assert_eq!(report.mismatched, 1);
        assert!(report.request_latency.p50 >= Duration::from_millis(49));
        assert!(report.request_latency.p50 <= Duration::from_millis(52));
        assert!(report.request_latency.max >= Duration::from_millis(100));
        assert!(!report.is_clean());
        assert!((report.throughput() - 102.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_report() {
        let metrics = MetricsCollector::new().unwrap();
        let report = metrics.report(Duration::ZERO, CorrelatorStats::default());
        assert_eq!(report.event_gap, LatencySummary::default());
        assert_eq!(report.throughput(), 0.0);
        assert!(report.is_clean());
    }
}

//! Simulation runner.

use crate::config::SimulatorConfig;
use crate::metrics::{MetricsCollector, SimulationReport};
use crate::workload::{MixedWorkload, WorkloadGenerator};
use callbridge_client::{Client, ClientError, ConfigError};
use callbridge_simulation::SimulatedNative;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that abort a simulation run.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Invalid client config: {0}")]
    Config(#[from] ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Failed to create histogram: {0}")]
    Metrics(#[from] hdrhistogram::CreationError),
}

/// Drives a [`Client`] against a [`SimulatedNative`] and measures it.
pub struct Simulator {
    config: SimulatorConfig,
    workload: MixedWorkload,
}

impl Simulator {
    /// Create a simulator.
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            workload: MixedWorkload::default(),
        }
    }

    /// Replace the request workload.
    pub fn with_workload(mut self, workload: MixedWorkload) -> Self {
        self.workload = workload;
        self
    }

    /// Run the simulation to completion.
    ///
    /// All single-shot requests are dispatched before any is awaited, then
    /// all subscriptions are opened and drained one after another.
    pub fn run(&mut self) -> Result<SimulationReport, SimulatorError> {
        let config = &self.config;
        let native = Arc::new(
            SimulatedNative::with_catalog(config.delivery)
                .with_seed(config.seed)
                .with_max_jitter(config.max_jitter),
        );
        let client = Client::new(config.client.clone(), native.clone())?;
        let mut metrics = MetricsCollector::new()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        info!(
            requests = config.requests,
            subscriptions = config.subscriptions,
            delivery = ?config.delivery,
            seed = config.seed,
            "Starting simulation"
        );
        let started = Instant::now();

        // Single-shot requests
        let planned = self.workload.generate_batch(config.requests, &mut rng);
        let mut in_flight = Vec::with_capacity(planned.len());
        for call in planned {
            let future = client.request(call.function, &call.params)?;
            in_flight.push((Instant::now(), future, call));
        }
        for (sent_at, future, call) in in_flight {
            match client.await_result(&future) {
                Ok(payload) => {
                    let matched = payload == call.expected;
                    if !matched {
                        warn!(
                            request_id = %future.request_id(),
                            function = call.function,
                            "Response does not match its request"
                        );
                    }
                    metrics.record_request(sent_at.elapsed(), matched);
                }
                Err(error) => {
                    warn!(request_id = %future.request_id(), %error, "Request failed");
                    metrics.record_request_failure();
                }
            }
        }

        // Subscriptions
        let params = json!({
            "count": config.events_per_subscription,
            "interval_ms": config.event_interval.as_millis() as u64,
        });
        let streams = (0..config.subscriptions)
            .map(|_| client.subscribe("net.subscribe_counter", &params))
            .collect::<Result<Vec<_>, _>>()?;
        for stream in &streams {
            let mut last = Instant::now();
            for item in stream.events() {
                match item {
                    Ok(_) => {
                        metrics.record_event(last.elapsed());
                        last = Instant::now();
                    }
                    Err(error) => {
                        warn!(request_id = %stream.request_id(), %error, "Stream failed");
                        metrics.record_stream_error();
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        let report = metrics.report(elapsed, client.stats());
        drop(streams);
        client.destroy();
        native.join();

        info!(
            ?elapsed,
            completed = report.requests_completed,
            events = report.events_received,
            "Simulation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_simulation::DeliveryMode;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_threaded_run_is_clean() {
        let config = SimulatorConfig::new(50, 3)
            .with_events_per_subscription(5)
            .with_max_jitter(Duration::from_millis(1));
        let report = Simulator::new(config).run().unwrap();

        assert_eq!(report.requests_completed, 50);
        assert_eq!(report.events_received, 15);
        assert_eq!(report.correlator.dispatched, 53);
        assert_eq!(report.correlator.resolved, 53);
        assert!(report.is_clean(), "{:?}", report);
        assert!(logs_contain("Simulation finished"));
    }

    #[test]
    fn test_inline_run_is_clean() {
        let config = SimulatorConfig::new(20, 2)
            .with_delivery(DeliveryMode::Inline)
            .with_max_jitter(Duration::ZERO)
            .with_event_interval(Duration::ZERO);
        let report = Simulator::new(config).run().unwrap();

        assert_eq!(report.requests_completed, 20);
        assert_eq!(report.events_received, 20);
        assert!(report.is_clean(), "{:?}", report);
    }

    #[test]
    fn test_inline_subscription_larger_than_queue() {
        let config = SimulatorConfig::new(0, 1)
            .with_delivery(DeliveryMode::Inline)
            .with_max_jitter(Duration::ZERO)
            .with_event_interval(Duration::ZERO)
            .with_events_per_subscription(5_000);
        assert!(config.client.callback_queue_capacity < 5_000);

        let report = Simulator::new(config).run().unwrap();
        assert_eq!(report.events_received, 5_000);
        assert!(report.is_clean(), "{:?}", report);
    }
}

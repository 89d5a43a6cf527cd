//! Configuration types for the simulator.

use callbridge_client::ClientConfig;
use callbridge_simulation::DeliveryMode;
use std::time::Duration;

/// Configuration for a simulation run.
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    /// Number of single-shot requests dispatched before any is awaited.
    pub requests: usize,

    /// Number of concurrently open subscriptions.
    pub subscriptions: usize,

    /// Events emitted by each subscription before it finishes.
    pub events_per_subscription: u64,

    /// Gap between two events of one subscription.
    pub event_interval: Duration,

    /// Upper bound of the random delay added before each callback.
    pub max_jitter: Duration,

    /// Where the simulated library delivers callbacks from.
    pub delivery: DeliveryMode,

    /// Client under test.
    pub client: ClientConfig,

    /// Random seed for the workload and the callback jitter.
    pub seed: u64,
}

impl SimulatorConfig {
    /// Create a configuration with the given request and subscription counts.
    pub fn new(requests: usize, subscriptions: usize) -> Self {
        Self {
            requests,
            subscriptions,
            events_per_subscription: 10,
            event_interval: Duration::from_millis(1),
            max_jitter: Duration::from_millis(2),
            delivery: DeliveryMode::Threaded,
            client: ClientConfig::default(),
            seed: 12345,
        }
    }

    /// Set the number of events per subscription.
    pub fn with_events_per_subscription(mut self, events: u64) -> Self {
        self.events_per_subscription = events;
        self
    }

    /// Set the gap between subscription events.
    pub fn with_event_interval(mut self, interval: Duration) -> Self {
        self.event_interval = interval;
        self
    }

    /// Set the maximum callback jitter.
    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Set the delivery mode.
    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the client configuration.
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Total number of streamed events expected over the run.
    pub fn total_events(&self) -> u64 {
        self.subscriptions as u64 * self.events_per_subscription
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::new(100, 4)
    }
}

//! Callbridge Simulator
//!
//! A workload simulator for the callback client, built on the simulated
//! native library. It dispatches many overlapping requests and
//! subscriptions, checks that every response reaches the request it belongs
//! to, and reports latency percentiles together with the correlator's
//! counters.
//!
//! # Example
//!
//! ```ignore
//! use callbridge_simulator::{Simulator, SimulatorConfig};
//! use std::time::Duration;
//!
//! let config = SimulatorConfig::new(1000, 8)
//!     .with_events_per_subscription(50)
//!     .with_max_jitter(Duration::from_millis(3));
//!
//! let report = Simulator::new(config).run()?;
//! println!("P99 latency: {:?}", report.request_latency.p99);
//! ```

pub mod config;
pub mod metrics;
pub mod runner;
pub mod workload;

pub use config::SimulatorConfig;
pub use metrics::{LatencySummary, MetricsCollector, SimulationReport};
pub use runner::{Simulator, SimulatorError};
pub use workload::{MixedWorkload, PlannedCall, WorkloadGenerator};

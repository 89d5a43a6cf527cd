//! Callbridge simulator CLI
//!
//! Runs a workload against the simulated native library and prints a report.

use anyhow::Context;
use callbridge_client::ClientConfig;
use callbridge_simulation::DeliveryMode;
use callbridge_simulator::{MixedWorkload, Simulator, SimulatorConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "callbridge-sim")]
#[command(about = "Workload simulator for the callback client")]
#[command(version)]
struct Cli {
    /// Client configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of single-shot requests
    #[arg(long, default_value = "1000")]
    requests: usize,

    /// Number of subscriptions
    #[arg(long, default_value = "8")]
    subscriptions: usize,

    /// Events per subscription
    #[arg(long, default_value = "20")]
    events: u64,

    /// Gap between subscription events (e.g., "1ms", "50ms")
    #[arg(long, default_value = "1ms")]
    event_interval: humantime::Duration,

    /// Maximum random delay before each callback
    #[arg(long, default_value = "2ms")]
    max_jitter: humantime::Duration,

    /// Ratio of hashing requests (0.0 to 1.0)
    #[arg(long, default_value = "0.5")]
    hash_ratio: f64,

    /// Where callbacks are delivered from
    #[arg(long, value_enum, default_value = "threaded")]
    delivery: Delivery,

    /// Random seed
    #[arg(long, default_value = "12345")]
    seed: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Delivery {
    Inline,
    Threaded,
}

impl From<Delivery> for DeliveryMode {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Inline => DeliveryMode::Inline,
            Delivery::Threaded => DeliveryMode::Threaded,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading client config from {}", path.display()))?,
        None => ClientConfig::default(),
    };

    let config = SimulatorConfig::new(cli.requests, cli.subscriptions)
        .with_events_per_subscription(cli.events)
        .with_event_interval(*cli.event_interval)
        .with_max_jitter(*cli.max_jitter)
        .with_delivery(cli.delivery.into())
        .with_client(client)
        .with_seed(cli.seed);

    let report = Simulator::new(config)
        .with_workload(MixedWorkload::new(cli.hash_ratio))
        .run()
        .context("simulation aborted")?;
    report.print();

    if !report.is_clean() {
        anyhow::bail!("simulation finished with errors");
    }
    Ok(())
}

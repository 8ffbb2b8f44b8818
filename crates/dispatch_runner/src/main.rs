//! Command-line entry point: connect to a simulator, run one traffic round
//! with the dispatch engine, and print the final metrics as JSON.
//!
//! Run with: cargo run -p dispatch_runner -- --server-url http://127.0.0.1:8000

use std::collections::BTreeSet;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dispatch_core::api::SimulatorApi;
use dispatch_core::client::SimulatorClient;
use dispatch_core::config::EngineConfig;
use dispatch_core::runner::DispatchRunner;
use dispatch_core::CarId;

#[derive(Parser)]
#[command(
    name = "dispatch_runner",
    about = "Online elevator dispatcher driving a tick-based simulator",
    long_about = "Connects to an elevator simulator over HTTP, selects a traffic\n\
                  round, and serves it with the two-layer trip planner until every\n\
                  passenger is delivered or the round's tick budget runs out."
)]
struct Cli {
    /// Simulator endpoint
    #[arg(long, default_value = "http://127.0.0.1:8000", env = "DISPATCH_SERVER_URL")]
    server_url: String,
    /// Pause between processed ticks in seconds
    #[arg(long, default_value_t = 0.2, env = "DISPATCH_TICK_DELAY")]
    tick_delay: f64,
    /// Traffic scenario index to select before running
    #[arg(long)]
    traffic: Option<usize>,
    /// Ticks before a stale assignment is reclaimed
    #[arg(long, default_value_t = 4)]
    reassign_after: u64,
    /// Car ids treated as heavy (activated only under load)
    #[arg(long, value_delimiter = ',', default_values_t = [3u32])]
    heavy_cars: Vec<CarId>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::default()
        .with_tick_delay(cli.tick_delay)
        .with_reassign_after_ticks(cli.reassign_after)
        .with_heavy_cars(cli.heavy_cars.iter().copied().collect::<BTreeSet<_>>());

    let mut api = SimulatorClient::new(&cli.server_url);
    if let Some(index) = cli.traffic {
        api.select_traffic(index)
            .with_context(|| format!("selecting traffic scenario {index}"))?;
    }

    let mut runner = DispatchRunner::new(api, config);
    let summary = runner.run().context("running dispatch round")?;

    println!(
        "--- Round finished at tick {} ({} ticks processed, drained: {}) ---",
        summary.final_tick, summary.ticks_processed, summary.drained
    );
    println!("{}", serde_json::to_string_pretty(&summary.metrics)?);
    Ok(())
}

//! envwatch service - background collector and one-shot lookups.
//!
//! Run with: `cargo run -p envwatch-service`

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use envwatch_service::{AppState, Config, Target};
use envwatch_store::Store;
use envwatch_types::{Coordinates, ProviderKind};

/// envwatch service - environmental data collection.
#[derive(Parser, Debug)]
#[command(name = "envwatch-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler in the foreground until interrupted (default).
    Run,

    /// Run one collection tick and print its report.
    Collect,

    /// Run one maintenance pass (cache, history, sessions) and print the result.
    Prune,

    /// Look up current conditions for a point.
    Observe {
        /// Latitude in decimal degrees.
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude in decimal degrees.
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Provider kind (air_quality, weather, pollen, wildfire, radon).
        #[arg(long)]
        kind: ProviderKind,
    },

    /// Print recorded history for a monitored location.
    History {
        /// Monitored location id.
        #[arg(long)]
        location: String,
        /// Provider kind.
        #[arg(long)]
        kind: ProviderKind,
        /// Days to look back.
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("envwatch_service=info".parse()?)
                .add_directive("envwatch_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    config.validate()?;

    let store = Store::open(&config.storage.path)?;
    let state = AppState::new(store, config)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(state).await,
        Command::Collect => print_json(&state.monitor.trigger_collection_now().await),
        Command::Prune => {
            let cache = state.scheduler.run_cache_prune().await;
            let history = state.scheduler.run_history_prune().await;
            print_json(&serde_json::json!({ "cache": cache, "history": history }))
        }
        Command::Observe { lat, lon, kind } => {
            let at = Coordinates::new(lat, lon)?;
            let observation = state
                .monitor
                .current_observation(Target::Coordinates(at), kind)
                .await?;
            print_json(&observation)
        }
        Command::History {
            location,
            kind,
            days,
        } => {
            let records = state.monitor.history(&location, kind, days).await?;
            print_json(&records)
        }
    }
}

async fn run(state: std::sync::Arc<AppState>) -> anyhow::Result<()> {
    let scheduler = std::sync::Arc::clone(&state.scheduler);
    let handles = scheduler.start();
    info!("Scheduler started; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    scheduler.stop();

    for handle in handles {
        handle.await?;
    }

    let stats = scheduler.state().stats().await;
    info!("Collected {} tick(s)", scheduler.state().ticks_completed());
    for provider in stats {
        info!(
            "{}: {} ok, {} degraded, {} failed",
            provider.kind, provider.success_count, provider.degraded_count, provider.failure_count
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

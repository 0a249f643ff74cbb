//! Thin process entry point. Parses `--config`, builds the routing/fan-out/
//! retry `Engine` from it, and blocks until interrupted.
//!
//! The HTTP listener, request decoding/encoding and Prometheus translation
//! layer are external collaborators and are not implemented here; this
//! binary exists so the core can be exercised standalone and so a real
//! front-end has a concrete place to plug in `Engine::write`/`Engine::query`.

use std::path::PathBuf;

use clap::Parser;
use tokio::signal::ctrl_c;
use tracing::info;

use shardgrid::{Config, Engine};

/// shardgrid is the routing, fan-out and retry core of a sharded InfluxDB v1
/// proxy.
#[derive(Parser, Debug)]
#[command(name = "shardgrid", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "shardgrid.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config);
    let engine = Engine::new(&config).expect("failed to build engine from configuration");

    info!(
        shards = engine.shards().len(),
        grid_size = config.grid_size,
        "shardgrid engine ready"
    );

    ctrl_c().await.expect("failed to listen for ctrl-c");
    info!("shutting down");
    engine.shutdown();
}

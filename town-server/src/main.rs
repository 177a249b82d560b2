//! Watch Party Town - Town Server
//!
//! Hosts one town: every viewing area on the map, the players connected to
//! it, and a terminal dashboard.
//!
//! Usage:
//!   cargo run --release
//!   cargo run --release -- --no-dashboard        # Plain logging mode
//!   cargo run --release -- --map town.json       # Custom Tiled map

mod config;
mod dashboard;
mod metrics;
mod network;

use parking_lot::RwLock;
use std::sync::Arc;

use config::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ServerConfig::from_env();

    // Shared metrics state
    let metrics = Arc::new(RwLock::new(metrics::Metrics::new(&config)));

    if config.use_dashboard {
        dashboard::run(config, metrics).await
    } else {
        network::run_with_logging(config, metrics).await
    }
}

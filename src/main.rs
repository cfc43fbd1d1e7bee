// src/main.rs

use anyhow::Result;
use keylin::config::Config;
use keylin::core::state::ServerState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_args(std::env::args().skip(1));
    tracing::info!(
        "starting on port {} (run_id {})",
        config.port,
        config.run_id
    );
    let state = Arc::new(ServerState::new(config));
    keylin::server::run(state).await
}

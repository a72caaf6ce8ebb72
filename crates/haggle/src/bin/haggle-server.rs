//! Runs a Haggle arena.

use std::sync::Arc;

use clap::Parser;
use haggle::{HaggleServer, ServerConfig};
use haggle_scheduler::MemoryLeaderboard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();
    let leaderboard = Arc::new(MemoryLeaderboard::new());
    let server = HaggleServer::builder()
        .config(config)
        .leaderboard(leaderboard.clone())
        .build()
        .await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    let scheduler = server.scheduler();
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            scheduler.shutdown().await?;
        }
    }

    for (rank, (identity, standing)) in leaderboard.standings().iter().enumerate() {
        println!(
            "{:>3}. {identity} mean {:.2} over {} games ({} agreements)",
            rank + 1,
            standing.mean(),
            standing.games,
            standing.agreements,
        );
    }
    Ok(())
}

//! Connects one agent to a Haggle arena.

use clap::{Parser, ValueEnum};
use haggle::{Client, StrategyFactory, conceder};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyKind {
    /// Asks for everything it values, then concedes a little each round.
    Conceder,
}

#[derive(Parser)]
#[command(name = "haggle-client", version, about = "Plays in a negotiation arena")]
struct Args {
    /// Server URL.
    #[arg(long, env = "HAGGLE_ADDRESS", default_value = "ws://127.0.0.1:8000/")]
    address: String,

    /// Name to play under. `name#tag` shares the private hash of `name`.
    #[arg(long, short, env = "HAGGLE_NAME")]
    name: String,

    #[arg(long, value_enum, default_value_t = StrategyKind::Conceder)]
    strategy: StrategyKind,
}

fn factory(kind: StrategyKind) -> impl StrategyFactory {
    match kind {
        StrategyKind::Conceder => conceder,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut client = Client::new(args.name, factory(args.strategy));

    let mut games = client.games();
    tokio::spawn(async move {
        while let Some(log) = games.recv().await {
            tracing::info!(
                game = %log.game,
                accept = log.result.accept,
                score = log.result.score,
                opponent_score = log.result.opponent_score,
                moves = log.moves.len(),
                "game over"
            );
        }
    });

    client.connect(&args.address).await?;
    Ok(())
}

//! # Haggle
//!
//! A proof-of-work gated arena where anonymous agents negotiate over
//! WebSocket.
//!
//! Agents connect, solve a hashcash challenge to earn an identity, and are
//! paired at random into two-party split-the-pie games. Each game is a
//! bounded alternating-offers negotiation refereed by the server; results
//! go to a leaderboard.
//!
//! This crate ties the layers together and provides both ends:
//!
//! - [`HaggleServer`]: accept loop, handshake, admission to the scheduler
//! - [`Client`]: an agent that plays with any [`Strategy`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use haggle::prelude::*;
//!
//! # async fn run() -> Result<(), HaggleError> {
//! let server = HaggleServer::builder()
//!     .bind("127.0.0.1:8000")
//!     .build()
//!     .await?;
//! tokio::spawn(server.run());
//!
//! let mut client = Client::new("alice", conceder);
//! client.connect("ws://127.0.0.1:8000/").await
//! # }
//! ```

mod client;
mod config;
mod error;
mod handler;
mod server;
mod strategy;

pub use client::{Client, Exchange, GameLog};
pub use config::ServerConfig;
pub use error::HaggleError;
pub use server::{HaggleServer, HaggleServerBuilder};
pub use strategy::{Conceder, Strategy, StrategyFactory, conceder};

/// Everything needed to run a server or write an agent.
pub mod prelude {
    pub use crate::{
        Client, Conceder, GameLog, HaggleError, HaggleServer, ServerConfig, Strategy,
        StrategyFactory, conceder,
    };
    pub use haggle_protocol::{EndResult, GameId, Offer, StartConfig};
    pub use haggle_scheduler::{Leaderboard, MemoryLeaderboard, Standing};
}

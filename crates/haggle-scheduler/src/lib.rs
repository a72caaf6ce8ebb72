//! Matchmaking for Haggle.
//!
//! The scheduler runs as a single Tokio task (actor model) that owns the
//! pool of authenticated sessions and the count of running games. It pairs
//! pooled sessions at random, keeps the number of concurrent games under a
//! global cap, reports every result to a [`Leaderboard`], and periodically
//! sends long-lived sessions back through the handshake.
//!
//! # Key types
//!
//! - [`Scheduler`]: the actor; build with [`Scheduler::new`], then spawn
//! - [`SchedulerHandle`]: admit sessions, read [`SchedulerStats`]
//! - [`SchedulerConfig`]: cap, per-session load, rotation interval, seed
//! - [`Leaderboard`] / [`MemoryLeaderboard`]: where results go

mod config;
mod error;
mod leaderboard;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use leaderboard::{Leaderboard, MemoryLeaderboard, Standing};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerStats};

//! Negotiation engine for Haggle.
//!
//! Given two players and a [`GameConfig`], a [`Negotiation`] drives the
//! offer/counter-offer loop to a terminal [`GameResult`]. It does not care
//! how the players were obtained; the scheduler hands it pooled sessions,
//! tests hand it fakes.
//!
//! # Key types
//!
//! - [`Player`]: the `start`/`step`/`end` capability set
//! - [`Negotiation`]: one game, consumed by `run`
//! - [`GameConfig`]: counts, private valuations, round limit
//! - [`Generator`]: samples configurations from a constraint set
//!
//! # Offers
//!
//! An offer always lists what its proposer keeps. Before it is shown to
//! the other side it is [`invert`]ed, so every player reasons about
//! "what I would keep".

mod engine;
mod error;
mod game;
mod generator;
mod player;

pub use engine::{Negotiation, Seat};
pub use error::NegotiationError;
pub use game::{GameConfig, GameResult, Valuations, invert, value};
pub use generator::{Generator, GeneratorConfig};
pub use haggle_protocol::Offer;
pub use player::Player;

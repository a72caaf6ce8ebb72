//! The capability set a negotiation needs from each side.

use std::future::Future;

use haggle_protocol::{EndResult, GameId, Offer, StartConfig};
use haggle_session::{Session, SessionError};
use haggle_transport::Connection;

/// One side of a negotiation.
///
/// [`Session`] is the networked implementation. Tests drive the engine
/// with in-process fakes.
pub trait Player: Send + Sync + 'static {
    /// Announces the game with this side's private view.
    fn start(
        &self,
        game: &GameId,
        config: StartConfig,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Asks for a move. `offer` is what this side keeps if it accepts the
    /// offer on the table, `None` on the opening move. Returns a
    /// counter-offer, or `None` to accept.
    fn step(
        &self,
        game: &GameId,
        offer: Option<Offer>,
    ) -> impl Future<Output = Result<Option<Offer>, SessionError>> + Send;

    /// Delivers the outcome.
    fn end(
        &self,
        game: &GameId,
        result: EndResult,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

impl<C: Connection> Player for Session<C> {
    fn start(
        &self,
        game: &GameId,
        config: StartConfig,
    ) -> impl Future<Output = Result<(), SessionError>> + Send {
        self.start_game(game, config)
    }

    fn step(
        &self,
        game: &GameId,
        offer: Option<Offer>,
    ) -> impl Future<Output = Result<Option<Offer>, SessionError>> + Send {
        self.step_game(game, offer)
    }

    fn end(
        &self,
        game: &GameId,
        result: EndResult,
    ) -> impl Future<Output = Result<(), SessionError>> + Send {
        self.end_game(game, result)
    }
}

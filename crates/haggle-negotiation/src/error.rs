//! Error types for the negotiation layer.

use haggle_session::SessionError;

/// Errors that abort a game or prevent one from being generated.
///
/// A game that fails with any of these still delivers `end` to both
/// sides before the error is returned.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// The opening move carried no offer.
    #[error("invalid offer: {0}")]
    InvalidOffer(String),

    /// An offer had the wrong length or claimed more than exists.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A `start` or `step` call failed (timeout, closed session, bad reply).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// No round configuration satisfies the generator constraints.
    #[error("generator constraints cannot be satisfied")]
    Unsatisfiable,
}

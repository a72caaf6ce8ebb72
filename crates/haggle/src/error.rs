//! Unified error type for Haggle.

use haggle_negotiation::NegotiationError;
use haggle_protocol::ProtocolError;
use haggle_scheduler::SchedulerError;
use haggle_session::SessionError;
use haggle_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert layer errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum HaggleError {
    /// A transport-level error (bind, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, timeout, closed).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A negotiation or generator error.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// A scheduler error (duplicate identity, unavailable).
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The proof-of-work solver task panicked or was cancelled.
    #[error("proof-of-work solver failed: {0}")]
    Solver(#[from] tokio::task::JoinError),
}

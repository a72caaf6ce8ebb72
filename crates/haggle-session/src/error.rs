//! Error types for the session layer.

use haggle_protocol::ProtocolError;
use haggle_transport::TransportError;

/// Errors produced by a [`Session`](crate::Session).
///
/// Auth and protocol errors close the session before they are returned.
/// A timeout fails only the call that timed out; the session stays usable.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The handshake reply was malformed or its proof-of-work was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The remote sent something that is not a valid reply.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No reply arrived before the call's deadline.
    #[error("request {seq} timed out")]
    Timeout { seq: u64 },

    /// The session is closed; nothing more can be sent on it.
    #[error("session closed")]
    Closed,

    /// Writing the request to the connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

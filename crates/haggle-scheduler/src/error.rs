//! Error types for the scheduler.

use haggle_session::IdentityHash;

/// Errors returned to callers of a [`SchedulerHandle`](crate::SchedulerHandle).
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A session with this identity is already pooled or being rotated.
    #[error("identity {0} is already connected")]
    DuplicateIdentity(IdentityHash),

    /// The session has not completed a handshake.
    #[error("session is not authenticated")]
    Unauthenticated,

    /// The scheduler actor has stopped.
    #[error("scheduler is unavailable")]
    Unavailable,
}

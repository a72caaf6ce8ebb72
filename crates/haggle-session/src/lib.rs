//! Correlated RPC sessions for Haggle.
//!
//! This crate turns one unordered bidirectional frame stream into
//! request/reply calls:
//!
//! 1. **Correlation**: every request carries a sequence number and is
//!    matched to exactly one outcome ([`Session::call`])
//! 2. **Identity**: a proof-of-work handshake ([`Verifier`]) establishes a
//!    pseudonymous [`IdentityHash`]
//! 3. **Game calls**: typed `start`/`step`/`end` wrappers used by the
//!    negotiation engine
//!
//! # How it fits in the stack
//!
//! ```text
//! Negotiation / Scheduler (above)  ← drive games through sessions
//!     ↕
//! Session Layer (this crate)  ← sequence numbers, timeouts, handshake
//!     ↕
//! Protocol + Transport (below)  ← envelopes and raw frames
//! ```

mod error;
mod identity;
mod pow;
mod session;

pub use error::SessionError;
pub use identity::IdentityHash;
pub use pow::{HashcashSolver, HashcashVerifier, Solver, Verifier, leading_zero_bits};
pub use session::{Session, SessionConfig, SessionState};

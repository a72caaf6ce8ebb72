//! Error types for the protocol layer.
//!
//! Each crate in Haggle defines its own error enum. When you see a
//! `ProtocolError`, the problem is in the shape of a message, not in
//! networking or game rules.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON, missing required fields,
    /// wrong data types, or a payload of the wrong kind.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The message parsed but violates a protocol rule, e.g. a payload
    /// that is not an object or a reply for an unknown sequence number.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

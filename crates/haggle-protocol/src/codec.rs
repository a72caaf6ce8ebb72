//! Codec trait and the JSON implementation.
//!
//! A codec converts between Rust types and the raw frames a transport
//! connection carries. The session
//! layer only talks to the [`Codec`] trait, so the frame format can change
//! without touching the RPC logic.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a codec lives inside sessions that are
/// shared across Tokio tasks for the lifetime of a connection.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Remote agents are expected to be small scripts in whatever language,
/// so the wire stays human-readable.
///
/// ## Example
///
/// ```rust
/// use haggle_protocol::{Codec, Envelope, GameId, JsonCodec, Request};
///
/// let codec = JsonCodec;
///
/// let envelope = Envelope {
///     seq: 3,
///     payload: Request::Step { game: GameId::new("g1"), offer: Some(vec![1, 0, 2]) },
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope<Request> = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, ErrorEnvelope};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<Envelope<serde_json::Value>, _> =
            JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_missing_seq_returns_decode_error() {
        let result: Result<Envelope<serde_json::Value>, _> =
            JsonCodec.decode(br#"{"payload":{}}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_error_envelope() {
        let bytes = JsonCodec
            .encode(&ErrorEnvelope::new("Unexpected seq: 9"))
            .unwrap();
        assert_eq!(bytes, br#"{"error":"Unexpected seq: 9"}"#);
    }
}

//! Core protocol types for Haggle's wire format.
//!
//! Every frame is a JSON object. Requests and replies share one envelope:
//!
//! ```text
//! { "seq": 4, "payload": { "kind": "step", "game": "…", "offer": [1, 0, 2] } }
//! ```
//!
//! The server is always the requester: it assigns `seq`, and the remote
//! agent echoes the same `seq` on its reply. A fatal protocol problem is
//! signalled with a bare `{ "error": "…" }` frame, after which the server
//! closes the connection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The protocol version announced in every `init` request.
pub const PROTOCOL_VERSION: u32 = 1;

/// A proposer-perspective claim: `offer[i]` is how many units of item type
/// `i` the proposer keeps for themselves.
pub type Offer = Vec<u32>;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque identifier of one negotiation, unique per game.
///
/// `#[serde(transparent)]` keeps it a bare JSON string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl GameId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// The frame that wraps every request and reply.
///
/// Generic over the payload so the same type serves typed outbound
/// requests (`Envelope<Request>`) and not-yet-validated inbound replies
/// (`Envelope<serde_json::Value>`). `sequence` is accepted as an alias of
/// `seq` on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Sequence number chosen by the requester and echoed by the replier.
    #[serde(alias = "sequence")]
    pub seq: u64,
    /// The request or reply body.
    pub payload: P,
}

/// A fatal protocol signal. The connection is terminated right after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Human-readable reason.
    pub error: String,
}

impl ErrorEnvelope {
    /// Builds an error frame from anything printable.
    pub fn new(reason: impl fmt::Display) -> Self {
        Self {
            error: reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Game views
// ---------------------------------------------------------------------------

/// One side's private view of a round, sent with `start`.
///
/// Field names are camelCase on the wire (`isFirst`, `maxRounds`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConfig {
    /// Whether this side makes the opening offer.
    pub is_first: bool,
    /// Units available per item type.
    pub counts: Vec<u32>,
    /// This side's per-unit value of each item type.
    pub values: Vec<u32>,
    /// Rounds available; each round is one move per side.
    pub max_rounds: u32,
}

/// What one side learns when a game ends, sent with `end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndResult {
    /// Whether an agreement was reached.
    pub accept: bool,
    /// This side's score.
    pub score: u64,
    /// The opponent's score.
    pub opponent_score: u64,
    /// The opponent's valuations, revealed after the game.
    pub opponent_values: Vec<u32>,
}

// ---------------------------------------------------------------------------
// Payload kinds
// ---------------------------------------------------------------------------

/// Server → agent requests.
///
/// `#[serde(tag = "kind")]` produces internally tagged objects such as
/// `{ "kind": "init", "version": 1, … }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Request {
    /// Opens the handshake: solve a proof-of-work over `prefix` (hex).
    Init {
        version: u32,
        complexity: u32,
        prefix: String,
    },

    /// A new game starts; `config` is this side's private view.
    Start { game: GameId, config: StartConfig },

    /// Your move. `offer` is what you would keep if you accepted the
    /// opponent's last offer; absent on the very first move.
    Step {
        game: GameId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offer: Option<Offer>,
    },

    /// The game is over.
    End { game: GameId, result: EndResult },
}

impl Request {
    /// The `kind` tag of this request.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Start { .. } => "start",
            Self::Step { .. } => "step",
            Self::End { .. } => "end",
        }
    }
}

/// Agent → server replies, one kind per request kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Response {
    /// Handshake reply: the chosen name and the solved challenge (hex).
    Init { name: String, challenge: String },

    /// Acknowledges `start`.
    Start,

    /// A counter-offer, or no offer to accept the one on the table.
    Step {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offer: Option<Offer>,
    },

    /// Acknowledges `end`.
    End,
}

impl Response {
    /// The `kind` tag of this reply.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Start => "start",
            Self::Step { .. } => "step",
            Self::End => "end",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_init_wire_shape() {
        let req = Request::Init {
            version: PROTOCOL_VERSION,
            complexity: 18,
            prefix: "ab01".into(),
        };
        let value = serde_json::to_value(Envelope { seq: 0, payload: req }).unwrap();
        assert_eq!(
            value,
            json!({
                "seq": 0,
                "payload": { "kind": "init", "version": 1, "complexity": 18, "prefix": "ab01" }
            })
        );
    }

    #[test]
    fn test_request_step_without_offer_omits_field() {
        let req = Request::Step {
            game: GameId::new("g"),
            offer: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({ "kind": "step", "game": "g" }));
    }

    #[test]
    fn test_start_config_uses_camel_case() {
        let req = Request::Start {
            game: GameId::new("g"),
            config: StartConfig {
                is_first: true,
                counts: vec![1, 2],
                values: vec![4, 3],
                max_rounds: 5,
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["config"]["isFirst"], json!(true));
        assert_eq!(value["config"]["maxRounds"], json!(5));
    }

    #[test]
    fn test_end_result_uses_camel_case() {
        let result = EndResult {
            accept: true,
            score: 7,
            opponent_score: 3,
            opponent_values: vec![1, 2],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({ "accept": true, "score": 7, "opponentScore": 3, "opponentValues": [1, 2] })
        );
    }

    #[test]
    fn test_response_step_missing_offer_is_acceptance() {
        let resp: Response = serde_json::from_value(json!({ "kind": "step" })).unwrap();
        assert_eq!(resp, Response::Step { offer: None });

        let resp: Response =
            serde_json::from_value(json!({ "kind": "step", "offer": null })).unwrap();
        assert_eq!(resp, Response::Step { offer: None });
    }

    #[test]
    fn test_response_unit_kinds_parse() {
        let start: Response = serde_json::from_value(json!({ "kind": "start" })).unwrap();
        let end: Response = serde_json::from_value(json!({ "kind": "end" })).unwrap();
        assert_eq!(start, Response::Start);
        assert_eq!(end, Response::End);
    }

    #[test]
    fn test_response_unknown_kind_rejected() {
        let result: Result<Response, _> =
            serde_json::from_value(json!({ "kind": "dance" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_response_init_requires_challenge() {
        let result: Result<Response, _> =
            serde_json::from_value(json!({ "kind": "init", "name": "alice" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_accepts_sequence_alias() {
        let env: Envelope<serde_json::Value> =
            serde_json::from_value(json!({ "sequence": 12, "payload": {} })).unwrap();
        assert_eq!(env.seq, 12);
    }

    #[test]
    fn test_kind_names_match_tags() {
        assert_eq!(Response::End.kind(), "end");
        let req = Request::End {
            game: GameId::new("g"),
            result: EndResult {
                accept: false,
                score: 0,
                opponent_score: 0,
                opponent_values: vec![],
            },
        };
        assert_eq!(req.kind(), "end");
        assert_eq!(serde_json::to_value(&req).unwrap()["kind"], json!("end"));
    }
}

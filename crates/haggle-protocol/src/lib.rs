//! Wire protocol for Haggle.
//!
//! This crate defines the "language" the server and remote agents speak:
//!
//! - **Types** ([`Envelope`], [`Request`], [`Response`], [`StartConfig`],
//!   [`EndResult`]): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Session (correlated calls)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    EndResult, Envelope, ErrorEnvelope, GameId, Offer, PROTOCOL_VERSION, Request,
    Response, StartConfig,
};

//! The RPC session: correlated request/reply calls over one connection.
//!
//! The server is always the requester. Every outbound request gets the next
//! sequence number and a pending slot; a single read task owns the inbound
//! half of the connection and routes each reply to the slot with the same
//! sequence number.
//!
//! ```text
//!   caller ── call(req) ──→ pending[seq] = tx ──→ conn.send({seq, payload})
//!                                                         │
//!   caller ←── rx ←── pending.remove(seq) ←── read task ←─┘
//! ```
//!
//! Anything the read task cannot route (malformed frame, unknown sequence,
//! reply that does not parse) is a protocol violation: the remote gets a
//! final `{ "error": … }` frame and the session closes.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use haggle_protocol::{
    Codec, EndResult, Envelope, ErrorEnvelope, GameId, JsonCodec, Offer,
    PROTOCOL_VERSION, ProtocolError, Request, Response, StartConfig,
};
use haggle_transport::{Connection, ConnectionId};
use tokio::sync::{Mutex, oneshot, watch};

use crate::{IdentityHash, SessionError, Verifier};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Deadlines applied by a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline of every game call (`start`, `step`, `end`).
    ///
    /// Default: 2 seconds.
    pub call_timeout: Duration,

    /// Deadline of the handshake. Long, because the remote has to solve
    /// a proof-of-work before it can answer.
    ///
    /// Default: 60 seconds.
    pub handshake_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of a session as seen by the session itself.
///
/// ```text
///   Authenticating ──(handshake ok)──→ Active ──(rehash)──→ Authenticating
///          │                             │
///          └──────────(close)────────────┴──────────→ Closed
/// ```
///
/// Draining is a scheduler concern and is tracked there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for a handshake to complete.
    Authenticating,
    /// Authenticated and usable for games.
    Active,
    /// Terminal. Every call fails with [`SessionError::Closed`].
    Closed,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

type Reply = Result<Response, SessionError>;

/// Timed-out sequences remembered per session. A reply older than the
/// oldest one kept is treated like any other unknown sequence.
const MAX_EXPIRED: usize = 64;

/// In-flight bookkeeping, guarded by one lock.
#[derive(Default)]
struct Pending {
    closed: bool,
    next_seq: u64,
    calls: HashMap<u64, oneshot::Sender<Reply>>,
    /// Sequences that timed out; a late reply to one of them is dropped.
    expired: BTreeSet<u64>,
}

impl Pending {
    fn expire(&mut self, seq: u64) {
        self.expired.insert(seq);
        while self.expired.len() > MAX_EXPIRED {
            self.expired.pop_first();
        }
    }
}

#[derive(Debug, Clone)]
struct Identity {
    name: String,
    hash: IdentityHash,
}

/// One remote agent behind a connection.
///
/// Created with [`Session::spawn`], which also starts the read task. The
/// returned `Arc` is the handle everything else holds.
pub struct Session<C: Connection> {
    conn: C,
    codec: JsonCodec,
    config: SessionConfig,
    pending: Mutex<Pending>,
    state: watch::Sender<SessionState>,
    identity: std::sync::Mutex<Option<Identity>>,
}

impl<C: Connection> Session<C> {
    /// Wraps a connection and starts routing its inbound frames.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(conn: C, config: SessionConfig) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Authenticating);
        let session = Arc::new(Self {
            conn,
            codec: JsonCodec,
            config,
            pending: Mutex::new(Pending::default()),
            state,
            identity: std::sync::Mutex::new(None),
        });

        tokio::spawn(Arc::clone(&session).read_loop());
        session
    }

    /// The underlying connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// The deadlines this session applies.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Returns `true` once the session has closed.
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Resolves once the session has closed, for any reason.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Closed).await;
    }

    /// Identity established by the last successful handshake.
    pub fn identity_hash(&self) -> Option<IdentityHash> {
        self.identity_slot().as_ref().map(|i| i.hash.clone())
    }

    /// Name announced in the last successful handshake.
    pub fn name(&self) -> Option<String> {
        self.identity_slot().as_ref().map(|i| i.name.clone())
    }

    fn identity_slot(&self) -> std::sync::MutexGuard<'_, Option<Identity>> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Sends `request` and waits for the reply carrying the same sequence.
    ///
    /// Every call ends in exactly one of: the reply, [`SessionError::Timeout`]
    /// (the session stays open), [`SessionError::Closed`], a
    /// [`SessionError::Transport`] failure while sending (the session is
    /// closed), or [`SessionError::Protocol`] if the reply does not parse
    /// (the session is closed).
    pub async fn call(&self, request: Request, timeout: Duration) -> Result<Response, SessionError> {
        let (tx, mut rx) = oneshot::channel();
        let seq = {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(SessionError::Closed);
            }
            let seq = pending.next_seq;
            pending.next_seq += 1;
            pending.calls.insert(seq, tx);
            seq
        };

        let frame = match self.codec.encode(&Envelope { seq, payload: &request }) {
            Ok(frame) => frame,
            Err(e) => {
                self.pending.lock().await.calls.remove(&seq);
                return Err(e.into());
            }
        };

        tracing::debug!(conn_id = %self.id(), seq, kind = request.kind(), "request");
        if let Err(e) = self.conn.send(&frame).await {
            self.pending.lock().await.calls.remove(&seq);
            tracing::debug!(conn_id = %self.id(), seq, error = %e, "send failed");
            self.close().await;
            return Err(e.into());
        }

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => {
                let mut pending = self.pending.lock().await;
                if pending.calls.remove(&seq).is_some() {
                    pending.expire(seq);
                    tracing::debug!(conn_id = %self.id(), seq, "request timed out");
                    return Err(SessionError::Timeout { seq });
                }
                drop(pending);
                // The reply was routed between the deadline and the lock.
                rx.try_recv().unwrap_or(Err(SessionError::Closed))
            }
        }
    }

    /// Runs the proof-of-work handshake and records the resulting identity.
    ///
    /// Also used to re-authenticate an already active session. A reply of
    /// the wrong shape is a [`SessionError::Protocol`]; an empty name, a
    /// non-hex challenge or a rejected proof-of-work is a
    /// [`SessionError::Auth`]. Both close the session.
    pub async fn handshake(&self, verifier: &dyn Verifier) -> Result<IdentityHash, SessionError> {
        self.set_state(SessionState::Authenticating);

        let request = Request::Init {
            version: PROTOCOL_VERSION,
            complexity: verifier.complexity(),
            prefix: hex::encode(verifier.prefix()),
        };
        let (name, challenge) = match self.call(request, self.config.handshake_timeout).await? {
            Response::Init { name, challenge } => (name, challenge),
            other => return Err(self.unexpected("init", &other).await),
        };

        if name.is_empty() {
            return Err(self.reject("name must not be empty").await);
        }
        let Ok(challenge) = hex::decode(&challenge) else {
            return Err(self.reject("challenge is not valid hex").await);
        };
        if !verifier.verify(&challenge) {
            return Err(self.reject("proof-of-work rejected").await);
        }

        let hash = IdentityHash::from_name(&name);
        *self.identity_slot() = Some(Identity {
            name: name.clone(),
            hash: hash.clone(),
        });
        self.set_state(SessionState::Active);
        tracing::info!(conn_id = %self.id(), %name, identity = %hash, "session authenticated");
        Ok(hash)
    }

    /// Announces a new game with this side's private view of it.
    pub async fn start_game(&self, game: &GameId, config: StartConfig) -> Result<(), SessionError> {
        let request = Request::Start {
            game: game.clone(),
            config,
        };
        match self.call(request, self.config.call_timeout).await? {
            Response::Start => Ok(()),
            other => Err(self.unexpected("start", &other).await),
        }
    }

    /// Asks for the next move.
    ///
    /// `offer` is the offer on the table as this side would keep it, or
    /// `None` on the opening move. Returns the counter-offer, or `None` if
    /// the remote accepts.
    pub async fn step_game(
        &self,
        game: &GameId,
        offer: Option<Offer>,
    ) -> Result<Option<Offer>, SessionError> {
        let request = Request::Step {
            game: game.clone(),
            offer,
        };
        match self.call(request, self.config.call_timeout).await? {
            Response::Step { offer } => Ok(offer),
            other => Err(self.unexpected("step", &other).await),
        }
    }

    /// Delivers the outcome of a game.
    pub async fn end_game(&self, game: &GameId, result: EndResult) -> Result<(), SessionError> {
        let request = Request::End {
            game: game.clone(),
            result,
        };
        match self.call(request, self.config.call_timeout).await? {
            Response::End => Ok(()),
            other => Err(self.unexpected("end", &other).await),
        }
    }

    async fn unexpected(&self, expected: &str, got: &Response) -> SessionError {
        let reason = format!("expected {expected} reply, got {}", got.kind());
        self.close_with_error(&reason).await;
        ProtocolError::InvalidMessage(reason).into()
    }

    async fn reject(&self, reason: &str) -> SessionError {
        tracing::warn!(conn_id = %self.id(), reason, "handshake rejected");
        self.close_with_error(reason).await;
        SessionError::Auth(reason.to_string())
    }

    // -----------------------------------------------------------------------
    // Closing
    // -----------------------------------------------------------------------

    /// Closes the session. Idempotent.
    ///
    /// Every pending call fails with [`SessionError::Closed`], and so does
    /// every later call.
    pub async fn close(&self) {
        let calls = {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return;
            }
            pending.closed = true;
            pending.expired.clear();
            std::mem::take(&mut pending.calls)
        };

        let failed = calls.len();
        for (_, tx) in calls {
            let _ = tx.send(Err(SessionError::Closed));
        }
        if let Err(e) = self.conn.close().await {
            tracing::debug!(conn_id = %self.id(), error = %e, "error closing connection");
        }
        self.state.send_replace(SessionState::Closed);
        tracing::debug!(conn_id = %self.id(), failed, "session closed");
    }

    /// Tells the remote why, then closes.
    pub async fn close_with_error(&self, reason: &str) {
        if self.pending.lock().await.closed {
            return;
        }
        match self.codec.encode(&ErrorEnvelope::new(reason)) {
            Ok(frame) => {
                if let Err(e) = self.conn.send(&frame).await {
                    tracing::debug!(conn_id = %self.id(), error = %e, "could not send error frame");
                }
            }
            Err(e) => tracing::debug!(conn_id = %self.id(), error = %e, "could not encode error frame"),
        }
        self.close().await;
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    async fn read_loop(self: Arc<Self>) {
        loop {
            match self.conn.recv().await {
                Ok(Some(frame)) => {
                    if let Err(reason) = self.dispatch(&frame).await {
                        tracing::warn!(conn_id = %self.id(), %reason, "protocol violation");
                        self.close_with_error(&reason).await;
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!(conn_id = %self.id(), "connection closed");
                    break;
                }
                Err(e) => {
                    tracing::debug!(conn_id = %self.id(), error = %e, "receive failed");
                    break;
                }
            }
        }
        self.close().await;
    }

    /// Routes one inbound frame. `Err` carries the reason the remote is
    /// told before the session closes.
    async fn dispatch(&self, frame: &[u8]) -> Result<(), String> {
        let envelope: Envelope<serde_json::Value> = self
            .codec
            .decode(frame)
            .map_err(|e| format!("malformed message: {e}"))?;
        let seq = envelope.seq;

        let tx = {
            let mut pending = self.pending.lock().await;
            match pending.calls.remove(&seq) {
                Some(tx) => tx,
                None if pending.expired.remove(&seq) => {
                    tracing::debug!(conn_id = %self.id(), seq, "dropping late reply");
                    return Ok(());
                }
                None => return Err(format!("unexpected seq: {seq}")),
            }
        };

        match serde_json::from_value::<Response>(envelope.payload) {
            Ok(response) => {
                tracing::debug!(conn_id = %self.id(), seq, kind = response.kind(), "reply");
                let _ = tx.send(Ok(response));
                Ok(())
            }
            Err(e) => {
                let reason = format!("malformed payload for seq {seq}: {e}");
                let _ = tx.send(Err(ProtocolError::Decode(e).into()));
                Err(reason)
            }
        }
    }
}

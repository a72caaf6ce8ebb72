//! Scheduler actor: owns the session pool and launches games.
//!
//! Every mutation of the pool and of the in-flight counter happens inside
//! one Tokio task. Games, handshakes and close watchers run in their own
//! tasks and report back through an internal event channel, so the actor
//! never waits on a remote agent.
//!
//! ```text
//!   handles ──Command──→ ┌───────────┐ ──spawn──→ game / rehash / watcher
//!                        │  actor    │
//!   tasks ────Event────→ └───────────┘ ←──────── (results)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use haggle_negotiation::{
    GameResult, Generator, Negotiation, NegotiationError, Seat,
};
use haggle_protocol::GameId;
use haggle_session::{IdentityHash, Session, SessionError, Verifier};
use haggle_transport::{Connection, ConnectionId};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};

use crate::{Leaderboard, SchedulerConfig, SchedulerError};

/// Command channel size for the scheduler actor.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Requests from the outside world.
enum Command<C: Connection> {
    /// Put an authenticated session into the pool.
    Admit {
        session: Arc<Session<C>>,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },

    Stats {
        reply: oneshot::Sender<SchedulerStats>,
    },

    /// Stop the actor and close every session.
    Shutdown,
}

/// Reports from tasks the actor spawned.
enum Event {
    GameFinished {
        game: GameId,
        players: [ConnectionId; 2],
        identities: [IdentityHash; 2],
        outcome: Result<GameResult, NegotiationError>,
    },
    Rehashed {
        conn: ConnectionId,
        outcome: Result<IdentityHash, SessionError>,
    },
    SessionClosed {
        conn: ConnectionId,
    },
}

/// A snapshot of scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Sessions selectable for new games.
    pub pooled: usize,
    /// Sessions out of the pool while they drain or re-authenticate.
    pub rotating: usize,
    /// Games currently running.
    pub in_flight: usize,
}

/// Handle to the running scheduler. Cheap to clone.
pub struct SchedulerHandle<C: Connection> {
    sender: mpsc::Sender<Command<C>>,
}

impl<C: Connection> Clone for SchedulerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C: Connection> SchedulerHandle<C> {
    /// Adds a session that has completed its handshake.
    ///
    /// On [`SchedulerError::DuplicateIdentity`] the session has already
    /// been closed with an error frame.
    pub async fn admit(&self, session: Arc<Session<C>>) -> Result<(), SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Command::Admit {
                session,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SchedulerError::Unavailable)?;
        reply_rx.await.map_err(|_| SchedulerError::Unavailable)?
    }

    /// Requests the current counters.
    pub async fn stats(&self) -> Result<SchedulerStats, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Command::Stats { reply: reply_tx })
            .await
            .map_err(|_| SchedulerError::Unavailable)?;
        reply_rx.await.map_err(|_| SchedulerError::Unavailable)
    }

    /// Tells the scheduler to stop.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.sender
            .send(Command::Shutdown)
            .await
            .map_err(|_| SchedulerError::Unavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    /// In the pool.
    Pooled,
    /// Out of the pool, waiting for its games to finish.
    Draining,
    /// Handshake in flight.
    Rehashing,
}

struct Entry<C: Connection> {
    session: Arc<Session<C>>,
    hash: IdentityHash,
    active_games: usize,
    rehash_budget: u32,
    state: EntryState,
}

/// The scheduler actor. Build it, then [`spawn`](Scheduler::spawn) it.
pub struct Scheduler<C: Connection> {
    config: SchedulerConfig,
    generator: Generator,
    verifier: Arc<dyn Verifier>,
    leaderboard: Arc<dyn Leaderboard>,
    rng: StdRng,
    /// Ordered so a seeded rng yields reproducible pairings.
    entries: BTreeMap<ConnectionId, Entry<C>>,
    in_flight: usize,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl<C: Connection> Scheduler<C> {
    pub fn new(
        config: SchedulerConfig,
        generator: Generator,
        verifier: Arc<dyn Verifier>,
        leaderboard: Arc<dyn Leaderboard>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            generator,
            verifier,
            leaderboard,
            rng,
            entries: BTreeMap::new(),
            in_flight: 0,
            events_tx,
            events_rx,
        }
    }

    /// Starts the actor task. It stops on [`SchedulerHandle::shutdown`]
    /// or once every handle is dropped.
    pub fn spawn(self) -> SchedulerHandle<C> {
        let (sender, receiver) = mpsc::channel(DEFAULT_CHANNEL_SIZE);
        tokio::spawn(self.run(receiver));
        SchedulerHandle { sender }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command<C>>) {
        tracing::info!(
            max_parallel_games = self.config.max_parallel_games,
            rehash_every = self.config.rehash_every,
            "scheduler started"
        );

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Admit { session, reply }) => {
                        let _ = reply.send(self.handle_admit(session));
                    }
                    Some(Command::Stats { reply }) => {
                        let _ = reply.send(self.stats());
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }

        for entry in self.entries.values() {
            let session = Arc::clone(&entry.session);
            tokio::spawn(async move { session.close().await });
        }
        tracing::info!("scheduler stopped");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::GameFinished {
                game,
                players,
                identities,
                outcome,
            } => self.handle_game_finished(game, players, identities, outcome),
            Event::Rehashed { conn, outcome } => self.handle_rehashed(conn, outcome),
            Event::SessionClosed { conn } => {
                if let Some(entry) = self.entries.remove(&conn) {
                    tracing::info!(
                        %conn,
                        identity = %entry.hash,
                        active_games = entry.active_games,
                        "session left the pool"
                    );
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    fn handle_admit(&mut self, session: Arc<Session<C>>) -> Result<(), SchedulerError> {
        let hash = session
            .identity_hash()
            .ok_or(SchedulerError::Unauthenticated)?;
        let conn = session.id();

        if self.identity_taken(&hash, conn) {
            tracing::info!(%conn, identity = %hash, "duplicate identity rejected");
            let error = SchedulerError::DuplicateIdentity(hash);
            let reason = error.to_string();
            tokio::spawn(async move { session.close_with_error(&reason).await });
            return Err(error);
        }

        self.watch_close(&session);
        self.entries.insert(
            conn,
            Entry {
                session,
                hash: hash.clone(),
                active_games: 0,
                rehash_budget: self.config.rehash_every,
                state: EntryState::Pooled,
            },
        );
        tracing::info!(%conn, identity = %hash, pool = self.pool_size(), "session joined the pool");

        self.fill();
        Ok(())
    }

    /// Whether another live entry already holds `hash`.
    fn identity_taken(&self, hash: &IdentityHash, conn: ConnectionId) -> bool {
        self.entries
            .iter()
            .any(|(id, entry)| *id != conn && entry.hash == *hash)
    }

    fn watch_close(&self, session: &Arc<Session<C>>) {
        let session = Arc::clone(session);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            session.closed().await;
            let _ = events.send(Event::SessionClosed { conn: session.id() });
        });
    }

    // -----------------------------------------------------------------------
    // Pairing
    // -----------------------------------------------------------------------

    /// Starts games until the cap is reached or fewer than two sessions
    /// can be picked.
    fn fill(&mut self) {
        while self.in_flight < self.config.max_parallel_games {
            let candidates: Vec<ConnectionId> = self
                .entries
                .iter()
                .filter(|(_, e)| {
                    e.state == EntryState::Pooled
                        && e.active_games < self.config.games_per_session
                        && !e.session.is_closed()
                })
                .map(|(id, _)| *id)
                .collect();
            if candidates.len() < 2 {
                return;
            }

            let picked = rand::seq::index::sample(&mut self.rng, candidates.len(), 2);
            self.launch(candidates[picked.index(0)], candidates[picked.index(1)]);
        }
    }

    fn launch(&mut self, first: ConnectionId, second: ConnectionId) {
        let (Some(a), Some(b)) = (self.entries.get(&first), self.entries.get(&second)) else {
            return;
        };
        let identities = [a.hash.clone(), b.hash.clone()];
        let negotiation = Negotiation::new(
            self.generator.sample(&mut self.rng),
            Seat::new(Arc::clone(&a.session), a.hash.clone()),
            Seat::new(Arc::clone(&b.session), b.hash.clone()),
        );

        for id in [first, second] {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.active_games += 1;
            }
        }
        self.in_flight += 1;

        let game = negotiation.id().clone();
        tracing::debug!(%game, %first, %second, in_flight = self.in_flight, "game launched");

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = negotiation.run().await;
            let _ = events.send(Event::GameFinished {
                game,
                players: [first, second],
                identities,
                outcome,
            });
        });
    }

    fn handle_game_finished(
        &mut self,
        game: GameId,
        players: [ConnectionId; 2],
        identities: [IdentityHash; 2],
        outcome: Result<GameResult, NegotiationError>,
    ) {
        self.in_flight = self.in_flight.saturating_sub(1);

        let result = match outcome {
            Ok(result) => {
                tracing::info!(
                    %game,
                    accepted = result.accepted,
                    score_first = result.score_first,
                    score_second = result.score_second,
                    "game finished"
                );
                result
            }
            Err(e) => {
                tracing::warn!(%game, error = %e, "game aborted");
                let [first, second] = identities;
                GameResult {
                    accepted: false,
                    score_first: 0,
                    score_second: 0,
                    first,
                    second,
                }
            }
        };
        self.leaderboard.record(&result);

        for conn in players {
            self.release(conn);
        }
        self.fill();
    }

    // -----------------------------------------------------------------------
    // Rotation
    // -----------------------------------------------------------------------

    /// Books a finished game against `conn`; starts its rehash once the
    /// budget is spent and no game is left.
    fn release(&mut self, conn: ConnectionId) {
        let rotate = self.config.rehash_every > 0;
        let Some(entry) = self.entries.get_mut(&conn) else {
            return;
        };

        entry.active_games = entry.active_games.saturating_sub(1);
        if rotate {
            entry.rehash_budget = entry.rehash_budget.saturating_sub(1);
            if entry.rehash_budget == 0 && entry.state == EntryState::Pooled {
                entry.state = EntryState::Draining;
                tracing::debug!(%conn, identity = %entry.hash, "session draining for rehash");
            }
        }

        if entry.state == EntryState::Draining && entry.active_games == 0 {
            entry.state = EntryState::Rehashing;
            tracing::info!(%conn, identity = %entry.hash, "rehashing session");

            let session = Arc::clone(&entry.session);
            let verifier = Arc::clone(&self.verifier);
            let events = self.events_tx.clone();
            tokio::spawn(async move {
                let outcome = session.handshake(verifier.as_ref()).await;
                let _ = events.send(Event::Rehashed { conn, outcome });
            });
        }
    }

    fn handle_rehashed(&mut self, conn: ConnectionId, outcome: Result<IdentityHash, SessionError>) {
        let hash = match outcome {
            Ok(hash) => hash,
            Err(e) => {
                if let Some(entry) = self.entries.remove(&conn) {
                    tracing::info!(%conn, identity = %entry.hash, error = %e, "rehash failed");
                    tokio::spawn(async move { entry.session.close().await });
                }
                return;
            }
        };

        if self.identity_taken(&hash, conn) {
            if let Some(entry) = self.entries.remove(&conn) {
                tracing::info!(%conn, identity = %hash, "duplicate identity after rehash");
                let reason = SchedulerError::DuplicateIdentity(hash).to_string();
                tokio::spawn(async move { entry.session.close_with_error(&reason).await });
            }
            return;
        }

        let Some(entry) = self.entries.get_mut(&conn) else {
            return;
        };
        entry.hash = hash;
        entry.rehash_budget = self.config.rehash_every;
        entry.state = EntryState::Pooled;
        tracing::debug!(%conn, identity = %entry.hash, "session back in the pool");

        self.fill();
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    fn pool_size(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state == EntryState::Pooled)
            .count()
    }

    fn stats(&self) -> SchedulerStats {
        let pooled = self.pool_size();
        SchedulerStats {
            pooled,
            rotating: self.entries.len() - pooled,
            in_flight: self.in_flight,
        }
    }
}

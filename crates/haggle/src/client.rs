//! Agent side: connect to a server, pass the handshake, and play every
//! game it is paired into.
//!
//! The server drives the conversation. The client only ever answers, so
//! its loop is a plain read-reply cycle. Proof-of-work is solved on the
//! blocking pool so a long solve never stalls the runtime.

use std::collections::HashMap;

use haggle_protocol::{
    Codec, EndResult, Envelope, ErrorEnvelope, GameId, JsonCodec, Offer, PROTOCOL_VERSION,
    ProtocolError, Request, Response, StartConfig,
};
use haggle_session::{HashcashSolver, Solver};
use haggle_transport::{ClientConnection, Connection};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{HaggleError, Strategy, StrategyFactory};

/// Any frame the server may send.
#[derive(Deserialize)]
#[serde(untagged)]
enum Inbound {
    Error(ErrorEnvelope),
    Request(Envelope<Request>),
}

/// One turn as this side saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// What this side would have kept by accepting. `None` on the opening
    /// move.
    pub offered: Option<Offer>,
    /// This side's counter-offer, or `None` for acceptance.
    pub reply: Option<Offer>,
}

/// Everything that happened in one finished game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameLog {
    pub game: GameId,
    pub config: StartConfig,
    pub moves: Vec<Exchange>,
    pub result: EndResult,
}

struct Game {
    strategy: Box<dyn Strategy>,
    config: StartConfig,
    moves: Vec<Exchange>,
}

/// A negotiating agent.
///
/// # Example
///
/// ```rust,no_run
/// use haggle::prelude::*;
///
/// # async fn run() -> Result<(), HaggleError> {
/// let mut client = Client::new("alice", conceder);
/// let mut games = client.games();
/// tokio::spawn(async move {
///     while let Some(log) = games.recv().await {
///         println!("{}: {:?}", log.game, log.result);
///     }
/// });
/// client.connect("ws://127.0.0.1:8000/").await
/// # }
/// ```
pub struct Client {
    name: String,
    factory: Box<dyn StrategyFactory>,
    codec: JsonCodec,
    games: HashMap<GameId, Game>,
    finished: Option<mpsc::UnboundedSender<GameLog>>,
}

impl Client {
    /// Creates a client that plays as `name` and builds one strategy per
    /// game from `factory`.
    pub fn new(name: impl Into<String>, factory: impl StrategyFactory) -> Self {
        Self {
            name: name.into(),
            factory: Box::new(factory),
            codec: JsonCodec,
            games: HashMap::new(),
            finished: None,
        }
    }

    /// Returns a receiver of finished games. Replaces any earlier
    /// receiver.
    pub fn games(&mut self) -> mpsc::UnboundedReceiver<GameLog> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.finished = Some(tx);
        rx
    }

    /// Connects to `url` and plays until the server closes the connection.
    pub async fn connect(&mut self, url: &str) -> Result<(), HaggleError> {
        let conn = ClientConnection::connect(url).await?;
        tracing::info!(%url, name = %self.name, "connected");
        self.run(&conn).await
    }

    /// Plays over an already established connection until it closes.
    ///
    /// # Errors
    ///
    /// Transport failures, and frames that are not valid server messages.
    /// An `{"error": …}` frame from the server is logged, not returned.
    pub async fn run<C: Connection>(&mut self, conn: &C) -> Result<(), HaggleError> {
        while let Some(frame) = conn.recv().await? {
            let envelope = match self.codec.decode::<Inbound>(&frame)? {
                Inbound::Error(error) => {
                    tracing::warn!(error = %error.error, "server reported an error");
                    continue;
                }
                Inbound::Request(envelope) => envelope,
            };

            let Some(reply) = self.handle(envelope.payload).await? else {
                continue;
            };
            let bytes = self.codec.encode(&Envelope {
                seq: envelope.seq,
                payload: reply,
            })?;
            conn.send(&bytes).await?;
        }

        tracing::info!(name = %self.name, "connection closed");
        Ok(())
    }

    async fn handle(&mut self, request: Request) -> Result<Option<Response>, HaggleError> {
        let response = match request {
            Request::Init {
                version,
                complexity,
                prefix,
            } => {
                if version != PROTOCOL_VERSION {
                    tracing::warn!(version, expected = PROTOCOL_VERSION, "protocol version mismatch");
                }
                let prefix = hex::decode(&prefix).map_err(|e| {
                    ProtocolError::InvalidMessage(format!("prefix is not hex: {e}"))
                })?;
                let challenge =
                    tokio::task::spawn_blocking(move || HashcashSolver.solve(complexity, &prefix))
                        .await?
                        .ok_or_else(|| {
                            ProtocolError::InvalidMessage(format!(
                                "complexity {complexity} cannot be met"
                            ))
                        })?;
                tracing::debug!(complexity, "proof-of-work solved");
                Response::Init {
                    name: self.name.clone(),
                    challenge: hex::encode(challenge),
                }
            }

            Request::Start { game, config } => {
                let strategy = self.factory.create(&config);
                self.games.insert(
                    game,
                    Game {
                        strategy,
                        config,
                        moves: Vec::new(),
                    },
                );
                Response::Start
            }

            Request::Step { game, offer } => {
                let Some(state) = self.games.get_mut(&game) else {
                    tracing::warn!(%game, "step for unknown game");
                    return Ok(None);
                };
                let reply = state.strategy.offer(offer.as_deref());
                state.moves.push(Exchange {
                    offered: offer,
                    reply: reply.clone(),
                });
                Response::Step { offer: reply }
            }

            Request::End { game, result } => {
                match self.games.remove(&game) {
                    Some(state) => {
                        tracing::debug!(
                            %game,
                            accept = result.accept,
                            score = result.score,
                            "game finished"
                        );
                        let log = GameLog {
                            game,
                            config: state.config,
                            moves: state.moves,
                            result,
                        };
                        if let Some(finished) = &self.finished {
                            // Nobody listening is fine.
                            let _ = finished.send(log);
                        }
                    }
                    None => tracing::warn!(%game, "end for unknown game"),
                }
                Response::End
            }
        };
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use haggle_session::{HashcashVerifier, Session, SessionConfig};
    use haggle_transport::MemoryConnection;

    use super::*;
    use crate::conceder;

    fn start(is_first: bool) -> StartConfig {
        StartConfig {
            is_first,
            counts: vec![1, 1],
            values: vec![10, 0],
            max_rounds: 1,
        }
    }

    #[tokio::test]
    async fn test_client_answers_handshake_and_game_calls() {
        let (server, remote) = MemoryConnection::pair();
        let mut client = Client::new("alice", conceder);
        let mut games = client.games();
        let agent = tokio::spawn(async move { client.run(&remote).await });

        let session = Session::spawn(server, SessionConfig::default());
        let verifier = HashcashVerifier::new(4, std::time::Duration::from_secs(60));
        let hash = session.handshake(&verifier).await.unwrap();
        assert_eq!(hash, haggle_session::IdentityHash::from_name("alice"));

        let game = GameId::new("g1");
        session.start_game(&game, start(true)).await.unwrap();
        let offer = session.step_game(&game, None).await.unwrap();
        assert_eq!(offer, Some(vec![1, 0]));

        let result = EndResult {
            accept: true,
            score: 10,
            opponent_score: 0,
            opponent_values: vec![0, 10],
        };
        session.end_game(&game, result.clone()).await.unwrap();

        let log = games.recv().await.unwrap();
        assert_eq!(log.game, game);
        assert_eq!(log.result, result);
        assert_eq!(
            log.moves,
            vec![Exchange {
                offered: None,
                reply: Some(vec![1, 0]),
            }]
        );

        session.close().await;
        agent.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_client_ignores_step_for_unknown_game() {
        let (server, remote) = MemoryConnection::pair();
        let mut client = Client::new("bob", conceder);
        let agent = tokio::spawn(async move { client.run(&remote).await });

        let session = Session::spawn(server, SessionConfig::default());
        let result = session
            .call(
                Request::Step {
                    game: GameId::new("nope"),
                    offer: None,
                },
                std::time::Duration::from_millis(50),
            )
            .await;
        assert!(matches!(result, Err(haggle_session::SessionError::Timeout { .. })));

        session.close().await;
        agent.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_client_survives_error_frame() {
        let (server, remote) = MemoryConnection::pair();
        let mut client = Client::new("carol", conceder);
        let agent = tokio::spawn(async move { client.run(&remote).await });

        server.send(br#"{"error":"duplicate identity"}"#).await.unwrap();
        server.close().await.unwrap();

        agent.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_client_impossible_complexity_is_error() {
        let (server, remote) = MemoryConnection::pair();
        let mut client = Client::new("erin", conceder);
        let agent = tokio::spawn(async move { client.run(&remote).await });

        server
            .send(br#"{"seq":0,"payload":{"kind":"init","version":1,"complexity":257,"prefix":"ab"}}"#)
            .await
            .unwrap();

        assert!(matches!(
            agent.await.unwrap(),
            Err(HaggleError::Protocol(ProtocolError::InvalidMessage(_)))
        ));
    }

    #[tokio::test]
    async fn test_client_malformed_frame_is_error() {
        let (server, remote) = MemoryConnection::pair();
        let mut client = Client::new("dave", conceder);
        let agent = tokio::spawn(async move { client.run(&remote).await });

        server.send(b"not json").await.unwrap();

        assert!(matches!(
            agent.await.unwrap(),
            Err(HaggleError::Protocol(_))
        ));
    }
}

//! The negotiation engine: drives one game between two players.
//!
//! ```text
//!   Starting ──→ Negotiating ──→ Ending ──→ Done
//!      │              │             ↑
//!      └──(error)─────┴─────────────┘
//! ```
//!
//! Ending always runs, so both sides hear how the game went even when a
//! `start` or `step` call failed. The failure is returned afterwards.

use std::sync::Arc;

use haggle_protocol::{EndResult, GameId, Offer};
use haggle_session::IdentityHash;

use crate::{GameConfig, GameResult, NegotiationError, Player, invert, value};

/// A player together with the identity its result is recorded under.
pub struct Seat<P> {
    pub player: Arc<P>,
    pub identity: IdentityHash,
}

impl<P> Seat<P> {
    pub fn new(player: Arc<P>, identity: IdentityHash) -> Self {
        Self { player, identity }
    }
}

/// Final scores of an accepted game, first mover first.
#[derive(Debug, Clone, Copy)]
struct Agreement {
    first: u64,
    second: u64,
}

/// One game. Consumed by [`Negotiation::run`].
pub struct Negotiation<P: Player> {
    id: GameId,
    config: GameConfig,
    first: Seat<P>,
    second: Seat<P>,
}

impl<P: Player> Negotiation<P> {
    /// Creates a game with a fresh random ID. `first` makes the opening
    /// offer and is scored with `config.valuations.first`.
    pub fn new(config: GameConfig, first: Seat<P>, second: Seat<P>) -> Self {
        let id = GameId::new(hex::encode(rand::random::<[u8; 16]>()));
        Self::with_id(id, config, first, second)
    }

    pub fn with_id(id: GameId, config: GameConfig, first: Seat<P>, second: Seat<P>) -> Self {
        Self {
            id,
            config,
            first,
            second,
        }
    }

    pub fn id(&self) -> &GameId {
        &self.id
    }

    /// Plays the game to completion.
    ///
    /// # Errors
    ///
    /// - [`NegotiationError::InvalidOffer`] if the opening move carries no
    ///   offer.
    /// - [`NegotiationError::Protocol`] if an offer is malformed.
    /// - [`NegotiationError::Session`] if a `start` or `step` call fails.
    ///
    /// Failures of the final `end` calls are logged and do not turn a
    /// finished game into an error.
    pub async fn run(self) -> Result<GameResult, NegotiationError> {
        let outcome = self.negotiate().await;
        let agreement = outcome.as_ref().ok().copied().flatten();

        self.finish(agreement).await;

        outcome?;
        Ok(GameResult {
            accepted: agreement.is_some(),
            score_first: agreement.map_or(0, |a| a.first),
            score_second: agreement.map_or(0, |a| a.second),
            first: self.first.identity.clone(),
            second: self.second.identity.clone(),
        })
    }

    /// Starting and Negotiating. `Ok(None)` means the round limit ran out.
    async fn negotiate(&self) -> Result<Option<Agreement>, NegotiationError> {
        let (first, second) = tokio::join!(
            self.first.player.start(&self.id, self.config.view(true)),
            self.second.player.start(&self.id, self.config.view(false)),
        );
        first?;
        second?;
        tracing::debug!(game = %self.id, "game started");

        let counts = &self.config.counts;
        let moves = self.config.max_rounds.saturating_mul(2);
        // Last offer made, as its proposer would keep it.
        let mut table: Option<Offer> = None;

        for turn in 0..moves {
            let first_moves = turn % 2 == 0;
            let seat = if first_moves { &self.first } else { &self.second };
            let shown = table.as_deref().map(|offer| invert(offer, counts));

            let reply = seat.player.step(&self.id, shown.clone()).await?;

            match (reply, shown) {
                (Some(offer), _) => {
                    self.config.validate(&offer)?;
                    tracing::debug!(game = %self.id, turn, ?offer, "offer");
                    table = Some(offer);
                }
                (None, Some(kept)) => {
                    // The mover keeps `kept`; the previous proposer keeps `table`.
                    let proposed = table.unwrap_or_default();
                    let (first_share, second_share) = if first_moves {
                        (kept, proposed)
                    } else {
                        (proposed, kept)
                    };
                    tracing::debug!(game = %self.id, turn, "offer accepted");
                    return Ok(Some(Agreement {
                        first: value(&first_share, &self.config.valuations.first),
                        second: value(&second_share, &self.config.valuations.second),
                    }));
                }
                (None, None) => {
                    return Err(NegotiationError::InvalidOffer(
                        "the opening move must carry an offer".into(),
                    ));
                }
            }
        }

        tracing::debug!(game = %self.id, "round limit reached");
        Ok(None)
    }

    /// Ending: notifies both sides concurrently.
    async fn finish(&self, agreement: Option<Agreement>) {
        let (first_score, second_score) = agreement.map_or((0, 0), |a| (a.first, a.second));
        let accept = agreement.is_some();

        let (first, second) = tokio::join!(
            self.first.player.end(
                &self.id,
                EndResult {
                    accept,
                    score: first_score,
                    opponent_score: second_score,
                    opponent_values: self.config.valuations.second.clone(),
                },
            ),
            self.second.player.end(
                &self.id,
                EndResult {
                    accept,
                    score: second_score,
                    opponent_score: first_score,
                    opponent_values: self.config.valuations.first.clone(),
                },
            ),
        );

        for (identity, result) in [(&self.first.identity, first), (&self.second.identity, second)] {
            if let Err(e) = result {
                tracing::debug!(game = %self.id, %identity, error = %e, "end notification failed");
            }
        }
    }
}

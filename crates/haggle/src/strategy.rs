//! Agent-side negotiation strategies.

use haggle_negotiation::value;
use haggle_protocol::{Offer, StartConfig};

/// Decides one side's moves in a single game.
///
/// A new instance is created for every game, so implementations may keep
/// per-game state.
pub trait Strategy: Send {
    /// Called on each of this side's turns. `offer` is what this side would
    /// keep if it accepted the opponent's last offer, and is `None` on the
    /// opening move.
    ///
    /// Returns a counter-offer (what this side wants to keep), or `None`
    /// to accept. Accepting on the opening move is a protocol violation.
    fn offer(&mut self, offer: Option<&[u32]>) -> Option<Offer>;
}

/// Builds a [`Strategy`] for each new game.
///
/// Implemented for any `Fn(&StartConfig) -> Box<dyn Strategy>`, so a plain
/// function such as [`conceder`] works as a factory.
pub trait StrategyFactory: Send + Sync + 'static {
    fn create(&self, config: &StartConfig) -> Box<dyn Strategy>;
}

impl<F> StrategyFactory for F
where
    F: Fn(&StartConfig) -> Box<dyn Strategy> + Send + Sync + 'static,
{
    fn create(&self, config: &StartConfig) -> Box<dyn Strategy> {
        self(config)
    }
}

/// Factory for [`Conceder`].
pub fn conceder(config: &StartConfig) -> Box<dyn Strategy> {
    Box::new(Conceder::new(config))
}

/// Opens by asking for everything it values and lowers its demand
/// linearly, reaching `total / max_rounds` on its last move.
#[derive(Debug, Clone)]
pub struct Conceder {
    counts: Vec<u32>,
    values: Vec<u32>,
    max_rounds: u32,
    round: u32,
}

impl Conceder {
    pub fn new(config: &StartConfig) -> Self {
        Self {
            counts: config.counts.clone(),
            values: config.values.clone(),
            max_rounds: config.max_rounds,
            round: 0,
        }
    }

    /// The least this side settles for on the current move.
    fn threshold(&self) -> u64 {
        if self.max_rounds == 0 {
            return 0;
        }
        let total = value(&self.counts, &self.values);
        let left = u64::from(self.max_rounds.saturating_sub(self.round));
        (total * left).div_ceil(u64::from(self.max_rounds))
    }

    /// A bundle worth at least `threshold`, taking the most valuable item
    /// types first.
    fn claim(&self, threshold: u64) -> Offer {
        let mut order: Vec<usize> = (0..self.counts.len())
            .filter(|&i| self.values[i] > 0)
            .collect();
        order.sort_by(|&a, &b| self.values[b].cmp(&self.values[a]).then(a.cmp(&b)));

        let mut claim = vec![0; self.counts.len()];
        let mut worth = 0;
        for i in order {
            while claim[i] < self.counts[i] && worth < threshold {
                claim[i] += 1;
                worth += u64::from(self.values[i]);
            }
        }
        claim
    }
}

impl Strategy for Conceder {
    fn offer(&mut self, offer: Option<&[u32]>) -> Option<Offer> {
        let threshold = self.threshold();
        self.round += 1;

        match offer {
            Some(offer) if value(offer, &self.values) >= threshold => None,
            _ => Some(self.claim(threshold)),
        }
    }
}

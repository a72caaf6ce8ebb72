//! Where finished games go.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use haggle_negotiation::GameResult;
use haggle_session::IdentityHash;

/// Sink for game results. Called from the scheduler actor, so
/// implementations must not block for long.
pub trait Leaderboard: Send + Sync + 'static {
    fn record(&self, result: &GameResult);
}

/// Running totals for one identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Standing {
    pub games: u64,
    pub agreements: u64,
    pub score: u64,
}

impl Standing {
    /// Mean score per game played.
    pub fn mean(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.score as f64 / self.games as f64
    }
}

/// In-process leaderboard keyed by identity hash.
#[derive(Debug, Default)]
pub struct MemoryLeaderboard {
    standings: Mutex<HashMap<IdentityHash, Standing>>,
}

impl MemoryLeaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// All identities, best mean score first. Ties break on identity.
    pub fn standings(&self) -> Vec<(IdentityHash, Standing)> {
        let mut all: Vec<_> = self
            .lock()
            .iter()
            .map(|(hash, standing)| (hash.clone(), *standing))
            .collect();
        all.sort_by(|(a_hash, a), (b_hash, b)| {
            b.mean().total_cmp(&a.mean()).then_with(|| a_hash.cmp(b_hash))
        });
        all
    }

    /// Totals for one identity.
    pub fn standing(&self, identity: &IdentityHash) -> Option<Standing> {
        self.lock().get(identity).copied()
    }

    /// Number of games recorded, counting each game once.
    pub fn games(&self) -> u64 {
        self.lock().values().map(|s| s.games).sum::<u64>() / 2
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<IdentityHash, Standing>> {
        self.standings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Leaderboard for MemoryLeaderboard {
    fn record(&self, result: &GameResult) {
        tracing::info!(
            first = %result.first,
            second = %result.second,
            accepted = result.accepted,
            score_first = result.score_first,
            score_second = result.score_second,
            "game recorded"
        );

        let mut standings = self.lock();
        for (identity, score) in [
            (&result.first, result.score_first),
            (&result.second, result.score_second),
        ] {
            let standing = standings.entry(identity.clone()).or_default();
            standing.games += 1;
            standing.score += score;
            if result.accepted {
                standing.agreements += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(first: &str, second: &str, accepted: bool, scores: (u64, u64)) -> GameResult {
        GameResult {
            accepted,
            score_first: scores.0,
            score_second: scores.1,
            first: IdentityHash::from_name(first),
            second: IdentityHash::from_name(second),
        }
    }

    #[test]
    fn test_record_accumulates_both_sides() {
        let board = MemoryLeaderboard::new();
        board.record(&result("a", "b", true, (6, 4)));
        board.record(&result("b", "a", false, (0, 0)));

        let a = board.standing(&IdentityHash::from_name("a")).unwrap();
        assert_eq!(
            a,
            Standing {
                games: 2,
                agreements: 1,
                score: 6
            }
        );
        assert_eq!(board.games(), 2);
    }

    #[test]
    fn test_standings_sorted_by_mean_score() {
        let board = MemoryLeaderboard::new();
        board.record(&result("low", "high", true, (2, 8)));
        board.record(&result("mid", "high", true, (5, 5)));

        let order: Vec<_> = board.standings().into_iter().map(|(hash, _)| hash).collect();
        assert_eq!(
            order,
            vec![
                IdentityHash::from_name("high"),
                IdentityHash::from_name("mid"),
                IdentityHash::from_name("low"),
            ]
        );
    }

    #[test]
    fn test_standing_mean_without_games_is_zero() {
        assert_eq!(Standing::default().mean(), 0.0);
    }
}

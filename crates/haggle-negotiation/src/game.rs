//! Round configuration, offers and scoring.

use haggle_protocol::{Offer, StartConfig};
use haggle_session::IdentityHash;

use crate::NegotiationError;

/// Each side's private per-unit values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Valuations {
    pub first: Vec<u32>,
    pub second: Vec<u32>,
}

/// Immutable input of one negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    /// Units available per item type.
    pub counts: Vec<u32>,
    pub valuations: Valuations,
    /// Rounds available; each round is one move per side.
    pub max_rounds: u32,
}

impl GameConfig {
    /// Number of item types.
    pub fn types(&self) -> usize {
        self.counts.len()
    }

    /// The private view one side receives with `start`.
    pub fn view(&self, is_first: bool) -> StartConfig {
        let values = if is_first {
            &self.valuations.first
        } else {
            &self.valuations.second
        };
        StartConfig {
            is_first,
            counts: self.counts.clone(),
            values: values.clone(),
            max_rounds: self.max_rounds,
        }
    }

    /// Checks that `offer` has one entry per item type and claims no more
    /// than exists of each.
    pub fn validate(&self, offer: &[u32]) -> Result<(), NegotiationError> {
        if offer.len() != self.counts.len() {
            return Err(NegotiationError::Protocol(format!(
                "offer has {} items, expected {}",
                offer.len(),
                self.counts.len()
            )));
        }
        if let Some(i) = offer.iter().zip(&self.counts).position(|(o, c)| o > c) {
            return Err(NegotiationError::Protocol(format!(
                "offer claims {} of item {i}, only {} exist",
                offer[i], self.counts[i]
            )));
        }
        Ok(())
    }
}

/// What the other side keeps if `offer` is accepted.
///
/// `offer` must already be within `counts`; entries past the end of
/// `counts` are dropped.
pub fn invert(offer: &[u32], counts: &[u32]) -> Offer {
    offer
        .iter()
        .zip(counts)
        .map(|(o, c)| c.saturating_sub(*o))
        .collect()
}

/// Total worth of `offer` under `values`.
pub fn value(offer: &[u32], values: &[u32]) -> u64 {
    offer
        .iter()
        .zip(values)
        .map(|(o, v)| u64::from(*o) * u64::from(*v))
        .sum()
}

/// Outcome of one game. Scores are zero unless an agreement was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    pub accepted: bool,
    pub score_first: u64,
    pub score_second: u64,
    pub first: IdentityHash,
    pub second: IdentityHash,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GameConfig {
        GameConfig {
            counts: vec![2, 3, 5],
            valuations: Valuations {
                first: vec![5, 1, 1],
                second: vec![1, 1, 2],
            },
            max_rounds: 1,
        }
    }

    #[test]
    fn test_invert_twice_is_identity() {
        let counts = [2, 3, 5];
        for a in 0..=2 {
            for b in 0..=3 {
                for c in 0..=5 {
                    let offer = vec![a, b, c];
                    assert_eq!(invert(&invert(&offer, &counts), &counts), offer);
                }
            }
        }
    }

    #[test]
    fn test_value_never_exceeds_whole_pie() {
        let config = config();
        let pie = value(&config.counts, &config.valuations.first);
        for a in 0..=2 {
            for b in 0..=3 {
                for c in 0..=5 {
                    assert!(value(&[a, b, c], &config.valuations.first) <= pie);
                }
            }
        }
    }

    #[test]
    fn test_value_matches_worked_example() {
        let config = config();
        assert_eq!(value(&[2, 0, 0], &config.valuations.first), 10);
        assert_eq!(
            value(&invert(&[2, 0, 0], &config.counts), &config.valuations.second),
            13
        );
    }

    #[test]
    fn test_validate_wrong_length_is_protocol_error() {
        let result = config().validate(&[1, 1]);
        assert!(matches!(result, Err(NegotiationError::Protocol(_))));
    }

    #[test]
    fn test_validate_over_count_is_protocol_error() {
        let result = config().validate(&[3, 0, 0]);
        assert!(matches!(result, Err(NegotiationError::Protocol(_))));
    }

    #[test]
    fn test_validate_bounds_inclusive() {
        assert!(config().validate(&[2, 3, 5]).is_ok());
        assert!(config().validate(&[0, 0, 0]).is_ok());
    }

    #[test]
    fn test_view_carries_own_values() {
        let config = config();
        let first = config.view(true);
        let second = config.view(false);

        assert!(first.is_first);
        assert_eq!(first.values, vec![5, 1, 1]);
        assert!(!second.is_first);
        assert_eq!(second.values, vec![1, 1, 2]);
        assert_eq!(second.counts, config.counts);
        assert_eq!(second.max_rounds, 1);
    }
}

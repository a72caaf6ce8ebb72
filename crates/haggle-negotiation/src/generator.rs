//! Samples round configurations.
//!
//! The generator enumerates every admissible configuration once, up front:
//!
//! 1. every count vector of `types` entries, each at least 1, whose total
//!    lies within `[min_obj, max_obj]`;
//! 2. for each count vector, every valuation vector whose whole-pie worth
//!    `Σ counts[i] * values[i]` is exactly `total`;
//! 3. every unordered pair of distinct valuations for the same counts.
//!
//! A seed in `0..max_seed()` picks a pair, and its low bit decides which
//! side of the pair moves first.

use rand::Rng;

use crate::{GameConfig, NegotiationError, Valuations};

/// Constraints on generated configurations.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Number of item types. At least 2.
    pub types: u32,
    /// Lower bound on the total number of units.
    pub min_obj: u32,
    /// Upper bound on the total number of units.
    pub max_obj: u32,
    /// Whole-pie worth under every valuation.
    pub total: u32,
    pub max_rounds: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            types: 3,
            min_obj: 1,
            max_obj: 6,
            total: 10,
            max_rounds: 5,
        }
    }
}

#[derive(Debug)]
struct ObjectSet {
    counts: Vec<u32>,
    valuations: Vec<Vec<u32>>,
}

/// Precomputed configuration space.
#[derive(Debug)]
pub struct Generator {
    max_rounds: u32,
    sets: Vec<ObjectSet>,
    /// `(set, left valuation, right valuation)` with `left < right`.
    pairs: Vec<(usize, usize, usize)>,
}

impl Generator {
    /// Enumerates the configuration space.
    ///
    /// # Errors
    ///
    /// [`NegotiationError::Unsatisfiable`] if fewer than two item types are
    /// requested or no count vector admits two distinct valuations.
    pub fn new(config: &GeneratorConfig) -> Result<Self, NegotiationError> {
        if config.types < 2 {
            return Err(NegotiationError::Unsatisfiable);
        }

        let mut sets = Vec::new();
        let mut counts = vec![0; config.types as usize];
        collect_sets(config, &mut counts, 0, 0, &mut sets);
        if sets.is_empty() {
            return Err(NegotiationError::Unsatisfiable);
        }

        let mut pairs = Vec::new();
        for (s, set) in sets.iter().enumerate() {
            for left in 0..set.valuations.len() {
                for right in left + 1..set.valuations.len() {
                    pairs.push((s, left, right));
                }
            }
        }

        tracing::debug!(sets = sets.len(), pairs = pairs.len(), "generator ready");
        Ok(Self {
            max_rounds: config.max_rounds,
            sets,
            pairs,
        })
    }

    /// Number of distinct seeds.
    pub fn max_seed(&self) -> usize {
        self.pairs.len() * 2
    }

    /// The configuration for `seed`, or `None` if it is out of range.
    pub fn get(&self, seed: usize) -> Option<GameConfig> {
        (seed < self.max_seed()).then(|| self.at(seed))
    }

    /// Draws a configuration uniformly over all seeds.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> GameConfig {
        self.at(rng.random_range(0..self.max_seed()))
    }

    fn at(&self, seed: usize) -> GameConfig {
        let (set, left, right) = self.pairs[seed >> 1];
        let set = &self.sets[set];

        let (first, second) = if seed % 2 == 1 {
            (right, left)
        } else {
            (left, right)
        };
        GameConfig {
            counts: set.counts.clone(),
            valuations: Valuations {
                first: set.valuations[first].clone(),
                second: set.valuations[second].clone(),
            },
            max_rounds: self.max_rounds,
        }
    }
}

fn collect_sets(
    config: &GeneratorConfig,
    counts: &mut [u32],
    i: usize,
    total_count: i64,
    out: &mut Vec<ObjectSet>,
) {
    let types = i64::from(config.types);
    // Leave at least one unit for every remaining type.
    let slack = types - i as i64 - 1;
    let min = (i64::from(config.min_obj) - total_count - slack).max(1);
    let max = i64::from(config.max_obj) - total_count - slack;

    for j in min..=max {
        counts[i] = j as u32;
        if (i as i64) < types - 1 {
            collect_sets(config, counts, i + 1, total_count + j, out);
        } else {
            let mut valuations = Vec::new();
            let mut values = vec![0; counts.len()];
            collect_valuations(config.total, counts, &mut values, 0, 0, &mut valuations);
            if valuations.len() >= 2 {
                out.push(ObjectSet {
                    counts: counts.to_vec(),
                    valuations,
                });
            }
        }
    }
}

fn collect_valuations(
    total: u32,
    counts: &[u32],
    values: &mut [u32],
    i: usize,
    total_value: u32,
    out: &mut Vec<Vec<u32>>,
) {
    let count = counts[i];
    let max = (total - total_value) / count;

    if i == counts.len() - 1 {
        if total_value + max * count == total {
            values[i] = max;
            out.push(values.to_vec());
        }
        return;
    }

    for j in 0..=max {
        values[i] = j;
        collect_valuations(total, counts, values, i + 1, total_value + j * count, out);
    }
}

//! Proof-of-work gate for the handshake.
//!
//! The session layer only needs a [`Verifier`]; remote agents need the
//! matching [`Solver`]. [`HashcashVerifier`] and [`HashcashSolver`] are a
//! SHA-256 hashcash pair:
//!
//! ```text
//! challenge = prefix || timestamp_ms (u64 BE) || nonce (u64 BE)
//! valid    ⇔ starts with the issued prefix
//!            ∧ timestamp ≤ now + skew
//!            ∧ now + skew ≤ timestamp + freshness
//!            ∧ leading_zero_bits(sha256(challenge)) ≥ complexity
//!            ∧ not seen before
//! ```

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use sha2::{Digest, Sha256};

/// Bytes of timestamp plus nonce after the prefix.
const SUFFIX_LEN: usize = 16;

/// Bits in a SHA-256 digest. No solution clears more.
const DIGEST_BITS: u32 = 256;

/// Largest tolerated lead of a solver's clock over ours.
const MAX_CLOCK_SKEW: Duration = Duration::from_secs(1);

/// Attempts between timestamp refreshes while solving.
const RESTAMP_EVERY: u64 = 1 << 20;

/// Checks solved challenges. Shared by every session on a server.
pub trait Verifier: Send + Sync + 'static {
    /// Leading zero bits a solution's digest must have.
    fn complexity(&self) -> u32;

    /// The prefix every solution must start with.
    fn prefix(&self) -> &[u8];

    /// Returns `true` if `challenge` is a valid, unused solution.
    fn verify(&self, challenge: &[u8]) -> bool;

    /// Rotates internal state. Called periodically by the server.
    fn reset(&self) {}
}

/// Produces solutions for a [`Verifier`]. Runs on the remote side.
pub trait Solver {
    /// Finds a challenge for the given complexity and prefix, or `None`
    /// if the complexity cannot be met.
    fn solve(&self, complexity: u32, prefix: &[u8]) -> Option<Vec<u8>>;
}

/// Counts leading zero bits of a digest.
pub fn leading_zero_bits(digest: &[u8]) -> u32 {
    let mut bits = 0;
    for byte in digest {
        if *byte == 0 {
            bits += 8;
        } else {
            return bits + byte.leading_zeros();
        }
    }
    bits
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Seen challenges in two generations so a reset never forgets a
/// solution that is still fresh.
#[derive(Default)]
struct SeenSets {
    current: HashSet<Vec<u8>>,
    previous: HashSet<Vec<u8>>,
}

/// Server-side hashcash verifier.
///
/// A challenge stays acceptable for at most `freshness` after it is first
/// seen, whatever timestamp it carries. Replay protection therefore holds
/// as long as [`Verifier::reset`] is called no more often than once per
/// freshness window.
pub struct HashcashVerifier {
    complexity: u32,
    prefix: Vec<u8>,
    freshness: Duration,
    skew: Duration,
    seen: Mutex<SeenSets>,
}

impl HashcashVerifier {
    /// Creates a verifier with a random 8-byte prefix.
    pub fn new(complexity: u32, freshness: Duration) -> Self {
        let prefix: [u8; 8] = rand::rng().random();
        Self::with_prefix(complexity, prefix.to_vec(), freshness)
    }

    /// Creates a verifier with a fixed prefix.
    pub fn with_prefix(complexity: u32, prefix: Vec<u8>, freshness: Duration) -> Self {
        Self {
            complexity,
            prefix,
            freshness,
            skew: MAX_CLOCK_SKEW.min(freshness / 4),
            seen: Mutex::new(SeenSets::default()),
        }
    }
}

impl Verifier for HashcashVerifier {
    fn complexity(&self) -> u32 {
        self.complexity
    }

    fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn verify(&self, challenge: &[u8]) -> bool {
        let Some(suffix) = challenge.strip_prefix(self.prefix.as_slice()) else {
            return false;
        };
        if suffix.len() != SUFFIX_LEN {
            return false;
        }

        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&suffix[..8]);
        let issued = u128::from(u64::from_be_bytes(timestamp));
        let horizon = u128::from(now_ms()) + self.skew.as_millis();
        if issued > horizon || horizon > issued + self.freshness.as_millis() {
            return false;
        }

        if leading_zero_bits(&Sha256::digest(challenge)) < self.complexity {
            return false;
        }

        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.current.contains(challenge) || seen.previous.contains(challenge) {
            return false;
        }
        seen.current.insert(challenge.to_vec());
        true
    }

    fn reset(&self) {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.previous = std::mem::take(&mut seen.current);
        tracing::debug!(remembered = seen.previous.len(), "proof-of-work verifier reset");
    }
}

/// Brute-force hashcash solver.
///
/// CPU-bound; async callers should run it on a blocking thread. The
/// timestamp is refreshed while searching so a long solve is still fresh
/// when it completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashcashSolver;

impl Solver for HashcashSolver {
    fn solve(&self, complexity: u32, prefix: &[u8]) -> Option<Vec<u8>> {
        if complexity > DIGEST_BITS {
            return None;
        }

        let stamp_at = prefix.len();
        let nonce_at = stamp_at + 8;
        let mut challenge = vec![0u8; nonce_at + 8];
        challenge[..stamp_at].copy_from_slice(prefix);

        let mut nonce: u64 = rand::rng().random();
        for attempt in 0u64.. {
            if attempt % RESTAMP_EVERY == 0 {
                challenge[stamp_at..nonce_at].copy_from_slice(&now_ms().to_be_bytes());
            }
            challenge[nonce_at..].copy_from_slice(&nonce.to_be_bytes());
            if leading_zero_bits(&Sha256::digest(&challenge)) >= complexity {
                return Some(challenge);
            }
            nonce = nonce.wrapping_add(1);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(complexity: u32) -> HashcashVerifier {
        HashcashVerifier::with_prefix(
            complexity,
            b"haggle".to_vec(),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_leading_zero_bits_counts_across_bytes() {
        assert_eq!(leading_zero_bits(&[0xff]), 0);
        assert_eq!(leading_zero_bits(&[0x00, 0x10]), 11);
        assert_eq!(leading_zero_bits(&[0x00, 0x00]), 16);
        assert_eq!(leading_zero_bits(&[]), 0);
    }

    #[test]
    fn test_solve_then_verify_succeeds() {
        let v = verifier(8);
        let challenge = HashcashSolver.solve(v.complexity(), v.prefix()).unwrap();

        assert!(challenge.starts_with(b"haggle"));
        assert!(v.verify(&challenge));
    }

    #[test]
    fn test_verify_rejects_replay() {
        let v = verifier(4);
        let challenge = HashcashSolver.solve(4, v.prefix()).unwrap();

        assert!(v.verify(&challenge));
        assert!(!v.verify(&challenge), "second use must be rejected");
    }

    #[test]
    fn test_reset_keeps_one_generation() {
        let v = verifier(4);
        let challenge = HashcashSolver.solve(4, v.prefix()).unwrap();
        assert!(v.verify(&challenge));

        v.reset();
        assert!(!v.verify(&challenge), "still remembered after one reset");

        v.reset();
        assert!(v.verify(&challenge), "forgotten after two resets");
    }

    #[test]
    fn test_verify_rejects_wrong_prefix() {
        let v = verifier(4);
        let challenge = HashcashSolver.solve(4, b"other!").unwrap();
        assert!(!v.verify(&challenge));
    }

    #[test]
    fn test_verify_rejects_insufficient_work() {
        let v = verifier(40);
        let challenge = HashcashSolver.solve(2, v.prefix()).unwrap();
        // A 2-bit solution clearing 40 bits is astronomically unlikely.
        assert!(!v.verify(&challenge));
    }

    #[test]
    fn test_verify_rejects_stale_timestamp() {
        let v = verifier(0);
        let mut challenge = b"haggle".to_vec();
        let stale = now_ms() - 120_000;
        challenge.extend_from_slice(&stale.to_be_bytes());
        challenge.extend_from_slice(&7u64.to_be_bytes());

        assert!(!v.verify(&challenge));
    }

    fn stamped(issued: u64) -> Vec<u8> {
        let mut challenge = b"haggle".to_vec();
        challenge.extend_from_slice(&issued.to_be_bytes());
        challenge.extend_from_slice(&7u64.to_be_bytes());
        challenge
    }

    #[test]
    fn test_verify_rejects_future_timestamp() {
        let v = verifier(0);
        assert!(!v.verify(&stamped(now_ms() + 5_000)));
    }

    #[test]
    fn test_verify_tolerates_small_clock_lead() {
        let v = verifier(0);
        assert!(v.verify(&stamped(now_ms() + 500)));
    }

    #[test]
    fn test_verify_future_dated_challenge_not_replayable_across_resets() {
        let v = HashcashVerifier::with_prefix(
            0,
            b"haggle".to_vec(),
            Duration::from_millis(1_000),
        );
        let challenge = stamped(now_ms() + 200);
        assert!(v.verify(&challenge));

        // Same schedule as the server: one reset per freshness window.
        v.reset();
        std::thread::sleep(Duration::from_millis(1_000));
        v.reset();

        assert!(!v.verify(&challenge), "expired before the seen sets forget it");
    }

    #[test]
    fn test_solve_stamps_time_of_solution() {
        let before = now_ms();
        let challenge = HashcashSolver.solve(8, b"haggle").unwrap();
        let after = now_ms();

        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&challenge[6..14]);
        let stamp = u64::from_be_bytes(stamp);
        assert!(before <= stamp && stamp <= after);
    }

    #[test]
    fn test_solve_impossible_complexity_is_none() {
        assert!(HashcashSolver.solve(DIGEST_BITS + 1, b"haggle").is_none());
    }

    #[test]
    fn test_verify_rejects_truncated_challenge() {
        let v = verifier(0);
        assert!(!v.verify(b"haggle"));
        assert!(!v.verify(b"hag"));
    }

    #[test]
    fn test_new_uses_random_prefix() {
        let a = HashcashVerifier::new(1, Duration::from_secs(1));
        let b = HashcashVerifier::new(1, Duration::from_secs(1));
        assert_eq!(a.prefix().len(), 8);
        assert_ne!(a.prefix(), b.prefix());
    }
}

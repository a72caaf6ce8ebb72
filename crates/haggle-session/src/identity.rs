//! Pseudonymous identities derived from claimed names.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the hex-encoded SHA-256 part of every identity hash.
const PRIVATE_HEX_LEN: usize = 64;

/// Stable pseudonymous identifier of a remote agent.
///
/// Derived from the name the agent announces during the handshake: the
/// part before the first `#` is private and only its SHA-256 is kept; a
/// non-empty tag after the `#` is appended verbatim as `-<tag>`. So
/// `alice#x` and `alice#y` share the same private hash but are distinct
/// identities, and nobody can claim `alice`'s hash without knowing
/// `alice`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IdentityHash(String);

impl IdentityHash {
    /// Derives the identity hash for a claimed name.
    pub fn from_name(name: &str) -> Self {
        let (private, tag) = name.split_once('#').unwrap_or((name, ""));

        let mut hash = hex::encode(Sha256::digest(private.as_bytes()));
        if !tag.is_empty() {
            hash.push('-');
            hash.push_str(tag);
        }
        Self(hash)
    }

    /// The hash of the private part, without any tag.
    ///
    /// A value that did not come from [`from_name`](Self::from_name) and is
    /// too short is returned whole.
    pub fn private_hash(&self) -> &str {
        self.0.get(..PRIVATE_HEX_LEN).unwrap_or(&self.0)
    }

    /// The tag suffix, if the name carried one.
    pub fn tag(&self) -> Option<&str> {
        self.0.get(PRIVATE_HEX_LEN + 1..)
    }

    /// The full hash as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

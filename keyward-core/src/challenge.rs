//! Ceremony challenges and the random source that produces them.

use std::fmt;
use std::sync::Mutex;

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::base64url;
use crate::error::{Result, WebAuthnError};

pub const MIN_CHALLENGE_BYTES: usize = 16;
pub const DEFAULT_CHALLENGE_BYTES: usize = 32;

/// Source of cryptographically secure bytes.
pub trait RandomSource: Send + Sync {
    fn fill(&self, dest: &mut [u8]);
}

/// Operating-system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// Deterministic generator for tests and reproducible fixtures. Not for production.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn fill(&self, dest: &mut [u8]) {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.fill_bytes(dest);
    }
}

impl fmt::Debug for SeededRandom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededRandom").finish_non_exhaustive()
    }
}

/// Random bytes bound to one ceremony. Serialized as base64url.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Challenge(#[serde(with = "base64url::bytes")] Vec<u8>);

impl Challenge {
    /// Draw `len` bytes from `random`. Fewer than 16 bytes is a configuration error.
    pub fn generate(random: &dyn RandomSource, len: usize) -> Result<Self> {
        if len < MIN_CHALLENGE_BYTES {
            return Err(WebAuthnError::Config(format!(
                "challenge length {len} is below the minimum of {MIN_CHALLENGE_BYTES} bytes"
            )));
        }
        let mut bytes = vec![0u8; len];
        random.fill(&mut bytes);
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64url(&self) -> String {
        base64url::encode(&self.0)
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({})", self.to_base64url())
    }
}

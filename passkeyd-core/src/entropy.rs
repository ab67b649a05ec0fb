//! Challenge entropy sources.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{CeremonyError, Result};

/// Default challenge length in bytes
pub const CHALLENGE_LEN: usize = 32;

/// Source of unpredictable challenge bytes.
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait EntropySource: Send + Sync {
    /// Fresh challenge bytes; callers reject anything shorter than 16 bytes.
    async fn challenge(&self) -> Result<Vec<u8>>;

    /// Identifier for logs.
    fn source_id(&self) -> &'static str;
}

/// Operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

#[async_trait]
impl EntropySource for OsEntropy {
    async fn challenge(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; CHALLENGE_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CeremonyError::Entropy(e.to_string()))?;
        Ok(bytes)
    }

    fn source_id(&self) -> &'static str {
        "os"
    }
}

/// Deterministic entropy for tests.
/// WARNING: Do not use in production - challenges are predictable!
pub struct MockEntropy {
    seed: u64,
    counter: AtomicU64,
}

impl MockEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(0),
        }
    }

    /// SHA-256 over seed and call counter, so successive challenges differ.
    pub fn next_challenge(&self) -> [u8; 32] {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(n.to_le_bytes());
        hasher.update(b"passkeyd-mock-entropy");
        hasher.finalize().into()
    }
}

impl Default for MockEntropy {
    fn default() -> Self {
        Self::new(0xDEADBEEF_CAFEBABE)
    }
}

#[async_trait]
impl EntropySource for MockEntropy {
    async fn challenge(&self) -> Result<Vec<u8>> {
        Ok(self.next_challenge().to_vec())
    }

    fn source_id(&self) -> &'static str {
        "mock"
    }
}

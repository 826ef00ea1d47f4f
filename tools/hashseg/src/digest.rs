//! Digest algorithm selection.
//!
//! One conversion uses exactly one algorithm; the choice is threaded
//! through the synthesizer and rewriter as a value, never stored in
//! mutable module state. Boot chains that predate SHA-256 verification
//! still use 20-byte SHA-1 tables.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// The digest algorithm for one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    /// SHA-1, 20-byte digests (legacy verifiers).
    Sha1,
    /// SHA-256, 32-byte digests.
    Sha256,
}

impl HashAlgo {
    /// Length in bytes of one digest entry.
    #[must_use]
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Digest `bytes` with this algorithm.
    #[must_use]
    pub fn hash(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(bytes).to_vec(),
            Self::Sha256 => Sha256::digest(bytes).to_vec(),
        }
    }
}

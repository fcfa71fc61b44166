//! # Core Types
//!
//! Identifiers and the signed price ask exchanged with storage providers.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Identity of a node on the network: hex digest of its public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Derive a peer id from an ed25519 public key.
    #[must_use]
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        Self(hex::encode(Sha256::digest(key.as_bytes())))
    }

    /// Deterministic id derived from an arbitrary label. Used by in-process
    /// network fabrics and tests, where nodes have no real keypair.
    #[must_use]
    pub fn derived(label: &str) -> Self {
        Self(hex::encode(Sha256::digest(label.as_bytes())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full digests make logs unreadable; the prefix is unique enough.
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// Identity of a storage provider, as addressed by callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A provider's signed price quote for storing data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAsk {
    /// Provider the quote belongs to.
    pub provider: ProviderId,
    /// Price per GiB per epoch, in attounits.
    pub price_per_gib: u64,
    /// Smallest piece the provider accepts, in bytes.
    pub min_piece_size: u64,
    /// Largest piece the provider accepts, in bytes.
    pub max_piece_size: u64,
    /// Unix time the quote was issued.
    pub created_at: u64,
    /// Unix time the quote stops being valid.
    pub expiry: u64,
    /// Monotonic sequence number; higher supersedes lower.
    pub seq_no: u64,
    /// ed25519 signature over [`Self::signable_bytes`].
    pub signature: Vec<u8>,
}

impl SignedAsk {
    /// Deterministic byte encoding of every field covered by the signature.
    #[must_use]
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.provider.as_str().len() + 48);
        bytes.extend_from_slice(self.provider.as_str().as_bytes());
        bytes.extend_from_slice(&self.price_per_gib.to_le_bytes());
        bytes.extend_from_slice(&self.min_piece_size.to_le_bytes());
        bytes.extend_from_slice(&self.max_piece_size.to_le_bytes());
        bytes.extend_from_slice(&self.created_at.to_le_bytes());
        bytes.extend_from_slice(&self.expiry.to_le_bytes());
        bytes.extend_from_slice(&self.seq_no.to_le_bytes());
        bytes
    }

    /// Verify the signature against the provider's public key.
    #[must_use]
    pub fn verify(&self, key: &VerifyingKey) -> bool {
        let Ok(signature) = Signature::from_slice(&self.signature) else {
            return false;
        };
        key.verify(&self.signable_bytes(), &signature).is_ok()
    }

    /// Whether the quote has expired at `now` (unix seconds).
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expiry
    }
}

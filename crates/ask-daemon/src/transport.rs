//! # Network Transport
//!
//! Narrow interface to the network the node talks through. The daemon only
//! needs two operations: dial an address, and ask a connected peer for a
//! provider's signed price quote. Everything else about the wire lives
//! behind this trait.
//!
//! [`MemoryNetwork`] is the in-process adapter the node registers by
//! default; a real transport is registered through the same constructor
//! override.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::debug;

use crate::types::{unix_now, PeerId, ProviderId, SignedAsk};

/// How long a quote published on the in-process fabric stays valid.
const DEFAULT_ASK_TTL_SECS: u64 = 600;

/// Transport errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// No node is reachable at the dialled address.
    #[error("no node reachable at `{addr}`")]
    Unreachable { addr: String },

    /// The peer is not part of this network.
    #[error("peer {peer} is not reachable on this network")]
    UnknownPeer { peer: PeerId },

    /// The peer holds no quote for the provider.
    #[error("peer {peer} has no ask for provider {provider}")]
    NoAsk { peer: PeerId, provider: ProviderId },
}

/// The network operations the node depends on.
#[async_trait]
pub trait Network: Send + Sync {
    /// Dial an address and return the peer reached there.
    async fn connect(&self, addr: &str) -> Result<PeerId, NetworkError>;

    /// Ask a connected peer for a provider's current signed quote.
    async fn query_ask(
        &self,
        peer: &PeerId,
        provider: &ProviderId,
    ) -> Result<SignedAsk, NetworkError>;
}

/// Shared handle to the configured transport.
#[derive(Clone)]
pub struct NetworkHandle {
    inner: Arc<dyn Network>,
}

impl NetworkHandle {
    pub fn new(network: impl Network + 'static) -> Self {
        Self {
            inner: Arc::new(network),
        }
    }

    pub async fn connect(&self, addr: &str) -> Result<PeerId, NetworkError> {
        self.inner.connect(addr).await
    }

    pub async fn query_ask(
        &self,
        peer: &PeerId,
        provider: &ProviderId,
    ) -> Result<SignedAsk, NetworkError> {
        self.inner.query_ask(peer, provider).await
    }
}

/// In-process network fabric: a set of named nodes, each optionally holding
/// signed quotes for providers. Quotes are signed with per-provider keys
/// generated on first publish.
#[derive(Default)]
pub struct MemoryNetwork {
    nodes: RwLock<HashMap<String, PeerId>>,
    asks: RwLock<HashMap<(PeerId, ProviderId), SignedAsk>>,
    provider_keys: RwLock<HashMap<ProviderId, SigningKey>>,
}

impl MemoryNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reachable node at `addr` and return its peer id.
    pub fn add_node(&self, addr: &str) -> PeerId {
        let peer = PeerId::derived(addr);
        self.nodes.write().insert(addr.to_string(), peer.clone());
        peer
    }

    /// Publish a provider quote on `peer`, valid for the default TTL.
    pub fn publish_ask(&self, peer: &PeerId, provider: &ProviderId, price_per_gib: u64) -> SignedAsk {
        self.publish_ask_with_expiry(peer, provider, price_per_gib, unix_now() + DEFAULT_ASK_TTL_SECS)
    }

    /// Publish a provider quote with an explicit expiry. Re-publishing bumps
    /// the sequence number.
    pub fn publish_ask_with_expiry(
        &self,
        peer: &PeerId,
        provider: &ProviderId,
        price_per_gib: u64,
        expiry: u64,
    ) -> SignedAsk {
        let seq_no = self
            .asks
            .read()
            .get(&(peer.clone(), provider.clone()))
            .map(|ask| ask.seq_no + 1)
            .unwrap_or(0);

        let mut ask = SignedAsk {
            provider: provider.clone(),
            price_per_gib,
            min_piece_size: 256,
            max_piece_size: 1 << 30,
            created_at: unix_now(),
            expiry,
            seq_no,
            signature: Vec::new(),
        };

        {
            let mut keys = self.provider_keys.write();
            let key = keys
                .entry(provider.clone())
                .or_insert_with(|| SigningKey::generate(&mut OsRng));
            ask.signature = key.sign(&ask.signable_bytes()).to_bytes().to_vec();
        }

        self.asks
            .write()
            .insert((peer.clone(), provider.clone()), ask.clone());
        ask
    }

    /// Public key quotes from `provider` are signed with, if any were
    /// published yet.
    #[must_use]
    pub fn provider_key(&self, provider: &ProviderId) -> Option<VerifyingKey> {
        self.provider_keys
            .read()
            .get(provider)
            .map(SigningKey::verifying_key)
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn connect(&self, addr: &str) -> Result<PeerId, NetworkError> {
        let Some(peer) = self.nodes.read().get(addr).cloned() else {
            return Err(NetworkError::Unreachable {
                addr: addr.to_string(),
            });
        };
        debug!(addr, peer = %peer, "dialled in-process node");
        Ok(peer)
    }

    async fn query_ask(
        &self,
        peer: &PeerId,
        provider: &ProviderId,
    ) -> Result<SignedAsk, NetworkError> {
        if !self.nodes.read().values().any(|known| known == peer) {
            return Err(NetworkError::UnknownPeer { peer: peer.clone() });
        }
        self.asks
            .read()
            .get(&(peer.clone(), provider.clone()))
            .cloned()
            .ok_or_else(|| NetworkError::NoAsk {
                peer: peer.clone(),
                provider: provider.clone(),
            })
    }
}

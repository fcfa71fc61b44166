//! # Ask API
//!
//! The node's public surface: query a storage provider's current signed
//! price quote through a connected peer. The implementation is constructed
//! inside the service graph and handed to the caller via an [`ApiSlot`]
//! filled by the extract-api startup action.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::peers::PeerManager;
use crate::repo::MetadataStore;
use crate::transport::{NetworkError, NetworkHandle};
use crate::types::{unix_now, ProviderId, SignedAsk};

/// Slot the assembled API implementation is extracted into.
pub type ApiSlot = Arc<OnceLock<Arc<dyn AskApi>>>;

/// An empty slot to pass into the API option.
#[must_use]
pub fn new_api_slot() -> ApiSlot {
    Arc::new(OnceLock::new())
}

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The node has no connected peers to query through.
    #[error("no connected peers to query through")]
    NoPeers,

    /// The transport failed to complete the query.
    #[error("network query failed: {0}")]
    Network(#[from] NetworkError),

    /// The peer answered with a quote for a different provider.
    #[error("ask for {requested} was answered by {answered}")]
    ProviderMismatch {
        requested: ProviderId,
        answered: ProviderId,
    },

    /// The peer answered with a quote that has already expired.
    #[error("ask from {provider} is already expired")]
    ExpiredAsk { provider: ProviderId },
}

/// Query a provider's signed price quote.
#[async_trait]
pub trait AskApi: Send + Sync {
    async fn query_ask(&self, provider: ProviderId) -> Result<SignedAsk, ApiError>;
}

/// Graph-constructed implementation of [`AskApi`].
pub struct AskService {
    peers: PeerManager,
    network: NetworkHandle,
    metadata: MetadataStore,
    metrics: Arc<Metrics>,
}

impl AskService {
    pub fn new(
        peers: PeerManager,
        network: NetworkHandle,
        metadata: MetadataStore,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            peers,
            network,
            metadata,
            metrics,
        }
    }

    fn checked(&self, requested: &ProviderId, ask: SignedAsk) -> Result<SignedAsk, ApiError> {
        if ask.provider != *requested {
            return Err(ApiError::ProviderMismatch {
                requested: requested.clone(),
                answered: ask.provider,
            });
        }
        if ask.is_expired(unix_now()) {
            return Err(ApiError::ExpiredAsk {
                provider: ask.provider,
            });
        }
        Ok(ask)
    }
}

#[async_trait]
impl AskApi for AskService {
    async fn query_ask(&self, provider: ProviderId) -> Result<SignedAsk, ApiError> {
        let correlation = Uuid::new_v4();
        debug!(%correlation, provider = %provider, "querying ask");

        let Some(peer) = self.peers.first_connected() else {
            self.metrics.record_ask_failure();
            return Err(ApiError::NoPeers);
        };

        let result = self
            .network
            .query_ask(&peer, &provider)
            .await
            .map_err(ApiError::from)
            .and_then(|ask| self.checked(&provider, ask));

        match result {
            Ok(ask) => {
                // Cache the latest accepted quote per provider.
                if let Ok(bytes) = serde_json::to_vec(&ask) {
                    self.metadata.put(format!("ask/{provider}"), bytes);
                }
                self.metrics.record_ask();
                info!(
                    %correlation,
                    peer = %peer,
                    provider = %provider,
                    price = ask.price_per_gib,
                    "ask received"
                );
                Ok(ask)
            }
            Err(error) => {
                self.metrics.record_ask_failure();
                warn!(%correlation, provider = %provider, %error, "ask query failed");
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::MemoryNetwork;
    use crate::types::PeerId;

    fn service_over(fabric: MemoryNetwork) -> (AskService, PeerManager) {
        let network = NetworkHandle::new(fabric);
        let peers = PeerManager::new(
            PeerId::derived("local"),
            "mem://local".to_string(),
            Duration::from_millis(10),
            network.clone(),
            Arc::new(Metrics::new()),
        );
        let service = AskService::new(
            peers.clone(),
            network,
            MetadataStore::new(),
            Arc::new(Metrics::new()),
        );
        (service, peers)
    }

    async fn wait_for_peer(peers: &PeerManager) {
        for _ in 0..100 {
            if peers.peer_count() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("peer never connected");
    }

    #[tokio::test]
    async fn test_query_without_peers_fails() {
        let (service, _peers) = service_over(MemoryNetwork::new());
        let err = service
            .query_ask(ProviderId::new("provider-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NoPeers));
    }

    #[tokio::test]
    async fn test_query_returns_and_caches_fresh_ask() {
        let fabric = MemoryNetwork::new();
        let seed = fabric.add_node("mem://seed");
        let provider = ProviderId::new("provider-1");
        fabric.publish_ask(&seed, &provider, 3_000);

        let (service, peers) = service_over(fabric);
        peers.add_seeds(["mem://seed".to_string()]);
        peers.run();
        wait_for_peer(&peers).await;

        let ask = service.query_ask(provider.clone()).await.unwrap();
        assert_eq!(ask.price_per_gib, 3_000);
        assert!(service
            .metadata
            .get(&format!("ask/{provider}"))
            .is_some());

        peers.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_ask_is_rejected() {
        let fabric = MemoryNetwork::new();
        let seed = fabric.add_node("mem://seed");
        let provider = ProviderId::new("provider-1");
        fabric.publish_ask_with_expiry(&seed, &provider, 3_000, unix_now().saturating_sub(1));

        let (service, peers) = service_over(fabric);
        peers.add_seeds(["mem://seed".to_string()]);
        peers.run();
        wait_for_peer(&peers).await;

        let err = service.query_ask(provider).await.unwrap_err();
        assert!(matches!(err, ApiError::ExpiredAsk { .. }));

        peers.shutdown().await.unwrap();
    }
}

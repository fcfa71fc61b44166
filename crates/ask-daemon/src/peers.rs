//! # Peer Manager
//!
//! Keeps the node connected. Seeds come from configuration (or a later
//! override); a background maintenance loop dials them until the connection
//! limit is reached. The manager owns every task it spawns and stops them
//! on teardown.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::transport::NetworkHandle;
use crate::types::PeerId;

/// Peer manager errors.
#[derive(Debug, Error)]
pub enum PeerError {
    /// A background task did not shut down cleanly.
    #[error("peer manager task failed: {source}")]
    TaskJoin {
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Tracks known and connected peers. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct PeerManager {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    local: PeerId,
    listen_addr: String,
    interval: Duration,
    network: NetworkHandle,
    metrics: Arc<Metrics>,
    /// Peer -> addresses we know for it.
    peerstore: RwLock<HashMap<PeerId, Vec<String>>>,
    connected: RwLock<HashSet<PeerId>>,
    seeds: RwLock<VecDeque<String>>,
    peer_limit: AtomicUsize,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PeerManager {
    pub fn new(
        local: PeerId,
        listen_addr: String,
        interval: Duration,
        network: NetworkHandle,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(PeerInner {
                local,
                listen_addr,
                interval,
                network,
                metrics,
                peerstore: RwLock::new(HashMap::new()),
                connected: RwLock::new(HashSet::new()),
                seeds: RwLock::new(VecDeque::new()),
                peer_limit: AtomicUsize::new(usize::MAX),
                shutdown,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Queue bootstrap addresses for the maintenance loop.
    pub fn add_seeds(&self, addrs: impl IntoIterator<Item = String>) {
        let mut seeds = self.inner.seeds.write();
        for addr in addrs {
            debug!(addr = %addr, "queued seed address");
            seeds.push_back(addr);
        }
    }

    /// Cap how many peers the maintenance loop keeps connected.
    pub fn set_peer_limit(&self, limit: usize) {
        self.inner.peer_limit.store(limit, Ordering::Relaxed);
    }

    #[must_use]
    pub fn peer_limit(&self) -> usize {
        self.inner.peer_limit.load(Ordering::Relaxed)
    }

    /// Record our own identity and listen address in the peer store, so the
    /// rest of the node can hand them out.
    pub fn announce_self(&self) {
        self.inner
            .peerstore
            .write()
            .entry(self.inner.local.clone())
            .or_default()
            .push(self.inner.listen_addr.clone());
        debug!(
            peer = %self.inner.local,
            addr = %self.inner.listen_addr,
            "announced self to peer store"
        );
    }

    /// Whether the peer store has an entry for `peer`.
    #[must_use]
    pub fn knows(&self, peer: &PeerId) -> bool {
        self.inner.peerstore.read().contains_key(peer)
    }

    #[must_use]
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.inner.connected.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.inner.connected.read().len()
    }

    /// Any currently connected peer, if there is one.
    #[must_use]
    pub fn first_connected(&self) -> Option<PeerId> {
        self.inner.connected.read().iter().next().cloned()
    }

    /// Spawn the background maintenance loop. The first pass runs
    /// immediately; later passes follow the configured interval.
    pub fn run(&self) {
        let inner = Arc::clone(&self.inner);
        let mut shutdown = self.inner.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => maintain(&inner).await,
                    _ = shutdown.changed() => {
                        debug!("peer maintenance loop stopping");
                        break;
                    }
                }
            }
        });
        self.inner.tasks.lock().push(handle);
        info!(interval = ?self.inner.interval, "peer manager running");
    }

    /// Signal every spawned task to stop and wait for them.
    pub async fn shutdown(&self) -> Result<(), PeerError> {
        // Send fails only when no loop was ever started; nothing to stop then.
        let _ = self.inner.shutdown.send(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock());
        let mut first_failure = None;
        for handle in handles {
            if let Err(source) = handle.await {
                warn!(error = %source, "peer manager task join failed");
                first_failure.get_or_insert(source);
            }
        }
        match first_failure {
            None => Ok(()),
            Some(source) => Err(PeerError::TaskJoin { source }),
        }
    }
}

/// One maintenance pass: dial queued seeds until the limit is reached.
/// Seeds that fail to connect are dropped with a warning.
async fn maintain(inner: &PeerInner) {
    let limit = inner.peer_limit.load(Ordering::Relaxed);
    while inner.connected.read().len() < limit {
        let Some(addr) = inner.seeds.write().pop_front() else {
            break;
        };
        match inner.network.connect(&addr).await {
            Ok(peer) => {
                if peer == inner.local {
                    debug!(addr = %addr, "seed pointed back at ourselves, skipping");
                    continue;
                }
                let newly_connected = inner.connected.write().insert(peer.clone());
                if newly_connected {
                    inner
                        .peerstore
                        .write()
                        .entry(peer.clone())
                        .or_default()
                        .push(addr.clone());
                    inner.metrics.record_peer_connected();
                    info!(peer = %peer, addr = %addr, "connected to peer");
                }
            }
            Err(error) => warn!(addr = %addr, %error, "failed to connect to seed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryNetwork;

    fn manager_over(fabric: MemoryNetwork) -> PeerManager {
        PeerManager::new(
            PeerId::derived("local"),
            "mem://local".to_string(),
            Duration::from_millis(10),
            NetworkHandle::new(fabric),
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn test_announce_self_populates_peerstore() {
        let manager = manager_over(MemoryNetwork::new());
        let local = PeerId::derived("local");

        assert!(!manager.knows(&local));
        manager.announce_self();
        assert!(manager.knows(&local));
        // Announcing is address book only; it is not a connection.
        assert_eq!(manager.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_maintenance_connects_seeds_up_to_limit() {
        let fabric = MemoryNetwork::new();
        fabric.add_node("mem://a");
        fabric.add_node("mem://b");
        fabric.add_node("mem://c");

        let manager = manager_over(fabric);
        manager.set_peer_limit(2);
        manager.add_seeds(["mem://a".to_string(), "mem://b".to_string(), "mem://c".to_string()]);
        manager.run();

        for _ in 0..100 {
            if manager.peer_count() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(manager.peer_count(), 2);
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_seeds_are_skipped() {
        let fabric = MemoryNetwork::new();
        fabric.add_node("mem://real");

        let manager = manager_over(fabric);
        manager.add_seeds(["mem://ghost".to_string(), "mem://real".to_string()]);
        manager.run();

        for _ in 0..100 {
            if manager.peer_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(manager.peer_count(), 1);
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_without_run_is_clean() {
        let manager = manager_over(MemoryNetwork::new());
        manager.shutdown().await.unwrap();
    }
}

//! # End-to-End Daemon Assembly Tests
//!
//! Drives the full option pipeline the daemon binary uses: repo on disk,
//! networking with an in-process fabric, API extraction, query, shutdown.

#[cfg(test)]
use std::time::Duration;

#[cfg(test)]
use ask_daemon::api::new_api_slot;
#[cfg(test)]
use ask_daemon::builder::{ask_api, config, new_node, online, repo};
#[cfg(test)]
use ask_daemon::config::NodeConfig;
#[cfg(test)]
use ask_daemon::repo::FsRepo;
#[cfg(test)]
use ask_daemon::transport::{MemoryNetwork, NetworkHandle};
#[cfg(test)]
use ask_daemon::types::{ProviderId, SignedAsk};
#[cfg(test)]
use node_assembly::{provide, AssemblyError, Built};

/// Config tuned for fast test convergence.
#[cfg(test)]
fn test_config(seeds: Vec<String>) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.network.bootstrap_peers = seeds;
    config.network.maintenance_interval_ms = 10;
    config.rpc.enabled = false;
    config
}

/// Poll the API until the first maintenance pass has connected a seed.
#[cfg(test)]
async fn query_until_connected(
    api: &std::sync::Arc<dyn ask_daemon::AskApi>,
    provider: &ProviderId,
) -> Option<SignedAsk> {
    for _ in 0..200 {
        match api.query_ask(provider.clone()).await {
            Ok(ask) => return Some(ask),
            Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_daemon_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let fs_repo = FsRepo::new(dir.path());
        fs_repo.init().unwrap();

        let fabric = MemoryNetwork::new();
        let seed = fabric.add_node("mem://seed");
        let provider = ProviderId::new("provider-42");
        let published = fabric.publish_ask(&seed, &provider, 9_000);
        let provider_key = fabric.provider_key(&provider).unwrap();

        let slot = new_api_slot();
        let stop = new_node([
            ask_api(slot.clone()),
            repo(fs_repo),
            online(),
            provide::<NetworkHandle, _>(move |_| Ok(Built::plain(NetworkHandle::new(fabric)))),
            config(test_config(vec!["mem://seed".to_string()])),
        ])
        .await
        .expect("daemon must assemble");

        let api = slot.get().cloned().expect("api extracted");
        let ask = query_until_connected(&api, &provider)
            .await
            .expect("ask must arrive");

        assert_eq!(ask, published);
        assert!(ask.verify(&provider_key), "quote signature must hold up");

        stop.stop().await.expect("clean shutdown");
    }

    #[tokio::test]
    async fn test_two_daemons_cannot_share_a_repo() {
        let dir = tempfile::tempdir().unwrap();
        let fs_repo = FsRepo::new(dir.path());
        fs_repo.init().unwrap();

        let first_slot = new_api_slot();
        let first = new_node([
            ask_api(first_slot.clone()),
            repo(fs_repo.clone()),
            online(),
            config(test_config(Vec::new())),
        ])
        .await
        .expect("first daemon must assemble");

        let second_slot = new_api_slot();
        let err = new_node([
            ask_api(second_slot),
            repo(fs_repo.clone()),
            online(),
            config(test_config(Vec::new())),
        ])
        .await
        .expect_err("second daemon must fail on the repo lock");
        assert!(matches!(err, AssemblyError::Composition(_)));

        // Releasing the first daemon's resources frees the repo.
        first.stop().await.expect("clean shutdown");

        let third_slot = new_api_slot();
        let third = new_node([
            ask_api(third_slot),
            repo(fs_repo),
            online(),
            config(test_config(Vec::new())),
        ])
        .await
        .expect("repo must be reusable after shutdown");
        third.stop().await.expect("clean shutdown");
    }
}

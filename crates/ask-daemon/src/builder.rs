//! # Node Builder
//!
//! Wires the daemon's subsystems into the assembly core. Each public
//! function here is a composable option; [`new_node`] merges the defaults
//! with whatever the caller layers on top and runs one assembly.
//!
//! Constructor registration is last-write-wins, so callers and tests can
//! override anything registered here (most usefully the transport) simply by
//! providing it again later in the option list.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use node_assembly::{
    apply_if, assemble, fail, options, override_key, provide, AssemblyError, BuildCtx, Built,
    DynError, Key, NodeKind, NodeOption, StopHandle,
};

use crate::api::{ApiSlot, AskApi, AskService};
use crate::config::NodeConfig;
use crate::metrics::Metrics;
use crate::peers::PeerManager;
use crate::repo::{FsRepo, Keystore, LockedRepo, MetadataStore, NodeIdentity};
use crate::transport::{MemoryNetwork, NetworkHandle};

/// Seeds the peer manager with the configured bootstrap addresses.
pub const SEED_PEERS_KEY: Key = Key::sentinel(0, "seed-peers");
/// Applies the configured connection limit to the peer manager.
pub const CONNECTION_LIMITS_KEY: Key = Key::sentinel(1, "connection-limits");

/// Startup actions run in the order they are declared here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokePoint {
    /// Initialize telemetry first so every later action can report into it.
    Telemetry = 0,
    /// Record our own identity and listen address in the peer store.
    AnnounceSelf,
    /// Start the peer manager's background maintenance loop.
    RunPeerManager,
    /// Hand the assembled API implementation to the caller. Keep this last.
    ExtractApi,
}

impl InvokePoint {
    /// Number of declared ordinals.
    pub const COUNT: usize = 4;

    /// Position of this action in the startup sequence.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }
}

/// Fill the startup slot for `point`.
fn invoke_at<F>(point: InvokePoint, name: &'static str, action: F) -> NodeOption
where
    F: FnOnce(&mut BuildCtx) -> Result<(), DynError> + Send + 'static,
{
    NodeOption::new(move |settings| {
        settings
            .set_invoke(point.ordinal(), name, action)
            .map(|_| ())
    })
}

/// Options every node starts from; caller options are applied after these
/// and may override any of them.
pub fn defaults() -> Vec<NodeOption> {
    vec![
        provide::<NodeConfig, _>(|_| Ok(Built::plain(NodeConfig::default()))),
        provide::<Metrics, _>(|_| Ok(Built::plain(Metrics::new()))),
        invoke_at(InvokePoint::Telemetry, "init-telemetry", |ctx| {
            let metrics = ctx.require::<Metrics>()?;
            metrics.mark_started();
            debug!("telemetry initialized");
            Ok(())
        }),
    ]
}

/// Networking: the transport, the peer manager, and the startup actions
/// that bring them online.
pub fn online() -> NodeOption {
    options([
        // Config overrides some of what this registers, so enforce that
        // online is applied first.
        NodeOption::new(|settings| {
            settings.online = true;
            Ok(())
        }),
        apply_if(
            |settings| settings.config_applied,
            fail("the online option must be applied before the config option"),
        ),
        // Default transport; deployments and tests supersede this by
        // providing their own handle after this option.
        provide::<NetworkHandle, _>(|_| Ok(Built::plain(NetworkHandle::new(MemoryNetwork::new())))),
        provide::<PeerManager, _>(|ctx| {
            let config = ctx.require::<NodeConfig>()?;
            let network = ctx.require::<NetworkHandle>()?;
            let metrics = ctx.require::<Metrics>()?;
            let identity = ctx.require::<NodeIdentity>()?;
            let manager = PeerManager::new(
                identity.peer_id.clone(),
                config.network.listen_addr.clone(),
                Duration::from_millis(config.network.maintenance_interval_ms),
                (*network).clone(),
                metrics,
            );
            let held = manager.clone();
            Ok(Built::with_teardown(manager, move || async move {
                held.shutdown().await.map_err(Into::into)
            }))
        }),
        override_key(SEED_PEERS_KEY, |ctx| {
            let config = ctx.require::<NodeConfig>()?;
            let manager = ctx.require::<PeerManager>()?;
            manager.add_seeds(config.network.bootstrap_peers.iter().cloned());
            Ok(Built::plain(()))
        }),
        override_key(CONNECTION_LIMITS_KEY, |ctx| {
            let config = ctx.require::<NodeConfig>()?;
            let manager = ctx.require::<PeerManager>()?;
            manager.set_peer_limit(config.network.max_peers);
            Ok(Built::plain(()))
        }),
        invoke_at(InvokePoint::AnnounceSelf, "announce-self", |ctx| {
            ctx.require::<PeerManager>()?.announce_self();
            Ok(())
        }),
        invoke_at(InvokePoint::RunPeerManager, "run-peer-manager", |ctx| {
            ctx.require::<PeerManager>()?.run();
            Ok(())
        }),
    ])
}

/// Replace the default configuration. Must come after [`online`].
pub fn config(config: NodeConfig) -> NodeOption {
    options([
        NodeOption::new(|settings| {
            settings.config_applied = true;
            Ok(())
        }),
        provide::<NodeConfig, _>(move |_| Ok(Built::plain(config))),
    ])
}

/// Open the repo for the node kind settled by earlier options. The lock is
/// taken while options apply, so a second daemon on the same repo fails
/// before anything is constructed.
pub fn repo(repo: FsRepo) -> NodeOption {
    NodeOption::new(move |settings| {
        let locked = repo
            .lock(settings.node_kind)
            .map_err(AssemblyError::composition)?;
        info!(
            path = %locked.root().display(),
            kind = ?locked.kind(),
            "repo locked"
        );
        options([
            provide::<LockedRepo, _>({
                let locked = locked.clone();
                move |_| {
                    let held = locked.clone();
                    Ok(Built::with_teardown(locked, move || async move {
                        held.release().map_err(Into::into)
                    }))
                }
            }),
            provide::<Keystore, _>(|ctx| {
                let locked = ctx.require::<LockedRepo>()?;
                Ok(Built::plain(locked.keystore().clone()))
            }),
            provide::<NodeIdentity, _>(|ctx| {
                let keystore = ctx.require::<Keystore>()?;
                Ok(Built::plain(NodeIdentity::new(&keystore)))
            }),
            provide::<MetadataStore, _>(|ctx| {
                let locked = ctx.require::<LockedRepo>()?;
                Ok(Built::plain(locked.metadata().clone()))
            }),
        ])
        .apply(settings)
    })
}

/// Assemble this node as an ask-answering worker and extract its API into
/// `slot` once startup reaches the extract-api action.
pub fn ask_api(slot: ApiSlot) -> NodeOption {
    options([
        NodeOption::new(|settings| {
            settings.node_kind = NodeKind::Worker;
            Ok(())
        }),
        invoke_at(InvokePoint::ExtractApi, "extract-api", move |ctx| {
            let peers = ctx.require::<PeerManager>()?;
            let network = ctx.require::<NetworkHandle>()?;
            let metadata = ctx.require::<MetadataStore>()?;
            let metrics = ctx.require::<Metrics>()?;
            let api: Arc<dyn AskApi> = Arc::new(AskService::new(
                (*peers).clone(),
                (*network).clone(),
                (*metadata).clone(),
                metrics,
            ));
            slot.set(api).map_err(|_| "api slot was already filled")?;
            Ok(())
        }),
    ])
}

/// Build and start a node: defaults first, then the caller's options.
pub async fn new_node(
    opts: impl IntoIterator<Item = NodeOption>,
) -> Result<StopHandle, AssemblyError> {
    let composed: Vec<NodeOption> = defaults().into_iter().chain(opts).collect();
    assemble(InvokePoint::COUNT, composed).await
}

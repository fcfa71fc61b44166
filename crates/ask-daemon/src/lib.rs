//! # Ask Daemon
//!
//! A worker node that answers storage-price ("ask") queries. The daemon is
//! put together declaratively: every subsystem is contributed as a
//! composable option (see [`builder`]), the assembly core resolves the
//! resulting constructor registry into a running service graph, and `main`
//! exposes the extracted API over JSON-RPC.
//!
//! ## Modular Structure
//!
//! - `builder/` - option wiring: sentinel keys, startup ordinals, node options
//! - `repo/` - on-disk keystore, repo lock, metadata store
//! - `peers/` - peer manager with background maintenance loop
//! - `transport/` - narrow network interface + in-process fabric
//! - `api/` - the ask query surface constructed inside the graph
//! - `rpc/` - JSON-RPC exposure of the extracted API
//! - `metrics/` - counter registry shared through the graph

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod api;
pub mod builder;
pub mod config;
pub mod metrics;
pub mod peers;
pub mod repo;
pub mod rpc;
pub mod transport;
pub mod types;

// Re-export the types callers need to assemble and talk to a node
pub use api::{new_api_slot, ApiError, ApiSlot, AskApi};
pub use builder::{ask_api, config, defaults, new_node, online, repo, InvokePoint};
pub use config::NodeConfig;
pub use types::{PeerId, ProviderId, SignedAsk};

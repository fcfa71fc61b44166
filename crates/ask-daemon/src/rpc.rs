//! # JSON-RPC Surface
//!
//! Thin HTTP/JSON-RPC exposure of the extracted [`AskApi`]. The server is
//! started by `main` after assembly succeeds; it is not part of the service
//! graph.

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{ApiError, AskApi};
use crate::types::{ProviderId, SignedAsk};

/// RPC server errors.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Binding or inspecting the listen socket failed.
    #[error("rpc server io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The methods exposed under the `ask` namespace.
#[rpc(server, namespace = "ask")]
pub trait AskRpc {
    /// Return the provider's current signed price quote.
    #[method(name = "queryAsk")]
    async fn query_ask(&self, provider: String) -> RpcResult<SignedAsk>;
}

struct AskRpcImpl {
    api: Arc<dyn AskApi>,
}

#[async_trait]
impl AskRpcServer for AskRpcImpl {
    async fn query_ask(&self, provider: String) -> RpcResult<SignedAsk> {
        let ask = self
            .api
            .query_ask(ProviderId::new(provider))
            .await
            .map_err(rpc_error)?;
        Ok(ask)
    }
}

fn rpc_error(err: ApiError) -> ErrorObjectOwned {
    let code = match err {
        ApiError::NoPeers => -32001,
        ApiError::Network(_) => -32002,
        ApiError::ProviderMismatch { .. } => -32003,
        ApiError::ExpiredAsk { .. } => -32004,
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}

/// A running JSON-RPC server.
pub struct RpcServer {
    addr: SocketAddr,
    handle: ServerHandle,
}

impl RpcServer {
    /// Address the server actually bound to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Ask the server to stop accepting connections.
    pub fn stop(self) {
        if self.handle.stop().is_err() {
            debug!("rpc server was already stopped");
        }
    }
}

/// Bind `listen_addr` and serve the API.
pub async fn serve(listen_addr: &str, api: Arc<dyn AskApi>) -> Result<RpcServer, RpcError> {
    let server = Server::builder().build(listen_addr).await?;
    let addr = server.local_addr()?;
    let handle = server.start(AskRpcImpl { api }.into_rpc());
    info!(%addr, "JSON-RPC server listening");
    Ok(RpcServer { addr, handle })
}

//! # Stop Handle
//!
//! Single-use teardown capability returned by a successful assembly. Consuming
//! [`StopHandle::stop`] releases every resource the graph acquired, in
//! reverse acquisition order, and reports *all* release failures rather than
//! only the first.

use std::fmt;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::error::{DynError, StopError, TeardownError};

/// Boxed async release action returned by a constructor.
pub type TeardownFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), DynError>> + Send>;

/// A collected teardown, labelled with the registry key that produced it.
pub(crate) struct NamedTeardown {
    pub(crate) name: &'static str,
    pub(crate) action: TeardownFn,
}

/// One-shot handle releasing everything a successful assembly acquired.
///
/// Consuming `stop` makes the handle single-use by construction; the assembly
/// it belonged to cannot be restarted — assemble again from scratch instead.
pub struct StopHandle {
    teardowns: Vec<NamedTeardown>,
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("resource_count", &self.teardowns.len())
            .finish()
    }
}

impl StopHandle {
    pub(crate) fn new(teardowns: Vec<NamedTeardown>) -> Self {
        Self { teardowns }
    }

    /// Number of resources holding a release action.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.teardowns.len()
    }

    /// Release all resources in reverse acquisition order.
    ///
    /// Every teardown runs even if earlier ones fail; failures are collected
    /// into a single [`StopError`]. Callers wanting a deadline race this
    /// future against their own timeout — no ambient timeout is imposed here.
    pub async fn stop(self) -> Result<(), StopError> {
        info!(resources = self.teardowns.len(), "stopping node");

        let mut failures = Vec::new();
        for teardown in self.teardowns.into_iter().rev() {
            debug!(name = teardown.name, "releasing");
            if let Err(source) = (teardown.action)().await {
                warn!(name = teardown.name, error = %source, "release failed");
                failures.push(TeardownError {
                    name: teardown.name,
                    source,
                });
            }
        }

        if failures.is_empty() {
            info!("node stopped");
            Ok(())
        } else {
            Err(StopError::new(failures))
        }
    }
}

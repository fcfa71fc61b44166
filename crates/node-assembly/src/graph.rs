//! # Service Graph
//!
//! Turns the constructor registry accumulated in a
//! [`Settings`](crate::Settings) value into live resources.
//!
//! Constructors declare their dependencies by calling
//! [`BuildCtx::require`] and produce exactly one value (plus an optional
//! teardown action) wrapped in [`Built`]. The graph builder instantiates
//! every registered constructor, resolving dependencies on demand; the order
//! constructors were registered in is irrelevant.
//!
//! Failure anywhere is fatal to the whole build: resources acquired so far
//! are released in reverse order before the error is returned, so a failed
//! assembly never leaves anything running.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, trace, warn};

use crate::error::{AssemblyError, DynError};
use crate::invoke::InvokeFn;
use crate::key::Key;
use crate::stop::{NamedTeardown, TeardownFn};

/// Boxed constructor as stored in the registry. The wrapper produced by
/// [`provide`](crate::provide) / [`override_key`](crate::override_key) runs
/// the user constructor and stores its output.
pub(crate) type ProviderFn = Box<dyn FnOnce(&mut BuildCtx) -> Result<(), AssemblyError> + Send>;

/// A constructed value paired with its optional teardown action.
///
/// Teardown actions are collected in acquisition order and run in reverse by
/// the stop handle. Returning the teardown alongside the value keeps resource
/// release explicit; there is no hidden lifecycle registry.
pub struct Built<T> {
    pub(crate) value: T,
    pub(crate) teardown: Option<TeardownFn>,
}

impl<T> Built<T> {
    /// A value with no release action.
    pub fn plain(value: T) -> Self {
        Self {
            value,
            teardown: None,
        }
    }

    /// A value paired with an async release action.
    pub fn with_teardown<F, Fut>(value: T, teardown: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), DynError>> + Send + 'static,
    {
        let action: TeardownFn = Box::new(move || {
            let fut: BoxFuture<'static, Result<(), DynError>> = Box::pin(teardown());
            fut
        });
        Self {
            value,
            teardown: Some(action),
        }
    }
}

/// Build-time context handed to constructors and startup actions.
///
/// Holds the not-yet-run constructors, the values built so far, and the
/// teardowns collected along the way.
pub struct BuildCtx {
    pending: HashMap<Key, ProviderFn>,
    built: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    /// Keys currently being constructed, outermost first. Used for cycle
    /// detection and error paths.
    building: Vec<Key>,
    /// Names of the constructors/actions on the current resolution path.
    path: Vec<&'static str>,
    teardowns: Vec<NamedTeardown>,
}

impl BuildCtx {
    pub(crate) fn new(providers: HashMap<Key, ProviderFn>) -> Self {
        Self {
            pending: providers,
            built: HashMap::new(),
            building: Vec::new(),
            path: Vec::new(),
            teardowns: Vec::new(),
        }
    }

    /// Resolve a dependency by type, running its constructor first if it has
    /// not been built yet.
    pub fn require<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>, AssemblyError> {
        let id = TypeId::of::<T>();
        if let Some(existing) = self.built.get(&id) {
            if let Ok(value) = Arc::clone(existing).downcast::<T>() {
                return Ok(value);
            }
        }

        let key = Key::of::<T>();
        if self.building.contains(&key) {
            let mut path: Vec<&str> = self.building.iter().map(Key::name).collect();
            path.push(key.name());
            return Err(AssemblyError::Cycle {
                path: path.join(" -> "),
            });
        }
        if !self.pending.contains_key(&key) {
            return Err(AssemblyError::MissingProvider {
                wanted: std::any::type_name::<T>(),
                required_by: self.required_by(),
            });
        }

        self.build_key(key)?;

        match self.built.get(&id) {
            Some(value) => Arc::clone(value)
                .downcast::<T>()
                .map_err(|_| Self::produced_nothing(key)),
            None => Err(Self::produced_nothing(key)),
        }
    }

    /// Run every constructor still pending. Dependencies resolve recursively,
    /// so the iteration order over the registry does not matter.
    pub(crate) fn build_all(&mut self) -> Result<(), AssemblyError> {
        while let Some(key) = self.pending.keys().next().copied() {
            self.build_key(key)?;
        }
        Ok(())
    }

    fn build_key(&mut self, key: Key) -> Result<(), AssemblyError> {
        let Some(build) = self.pending.remove(&key) else {
            return Ok(());
        };

        trace!(key = %key, "running constructor");
        self.building.push(key);
        self.path.push(key.name());
        let result = build(self);
        self.path.pop();
        self.building.pop();
        result
    }

    /// Run a startup action against the built graph.
    pub(crate) fn run_invoke(
        &mut self,
        name: &'static str,
        action: InvokeFn,
    ) -> Result<(), AssemblyError> {
        debug!(name, "running startup action");
        self.path.push(name);
        let result = action(self).map_err(|source| AssemblyError::Invoke { name, source });
        self.path.pop();
        result
    }

    /// Store a typed value (and its teardown) produced by a constructor.
    pub(crate) fn store<T: Send + Sync + 'static>(&mut self, key: Key, built: Built<T>) {
        let Built { value, teardown } = built;
        self.built.insert(TypeId::of::<T>(), Arc::new(value));
        if let Some(action) = teardown {
            self.push_teardown(key.name(), action);
        }
    }

    /// Record a teardown for an effect-only constructor.
    pub(crate) fn push_teardown(&mut self, name: &'static str, action: TeardownFn) {
        self.teardowns.push(NamedTeardown { name, action });
    }

    /// Release everything acquired so far, most recent first. Errors during
    /// unwind are logged; the original build error is the one reported.
    pub(crate) async fn unwind(&mut self) {
        let teardowns = std::mem::take(&mut self.teardowns);
        if teardowns.is_empty() {
            return;
        }
        debug!(
            count = teardowns.len(),
            "unwinding partially assembled graph"
        );
        for teardown in teardowns.into_iter().rev() {
            if let Err(error) = (teardown.action)().await {
                warn!(name = teardown.name, %error, "teardown failed during unwind");
            }
        }
    }

    pub(crate) fn into_teardowns(self) -> Vec<NamedTeardown> {
        self.teardowns
    }

    fn required_by(&self) -> String {
        self.path
            .last()
            .copied()
            .unwrap_or("assembler")
            .to_string()
    }

    fn produced_nothing(key: Key) -> AssemblyError {
        AssemblyError::Provider {
            key: key.name(),
            source: "constructor completed without producing a value".into(),
        }
    }
}

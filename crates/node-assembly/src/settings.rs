//! # Settings Registry
//!
//! The single mutable accumulator threaded through every option application.
//! Holds the keyed constructor map, the fixed-length invoke slot vector, and
//! the scalar flags options use to enforce ordering invariants between each
//! other.
//!
//! A `Settings` value lives for exactly one assembly: created fresh, mutated
//! strictly in sequence by the composed options, then consumed by the
//! assembler. Options are the only mutators (by convention); the registry
//! itself never rejects a duplicate key — later registrations replace earlier
//! ones, and the replacement is reported distinctly for diagnostics.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{AssemblyError, DynError};
use crate::graph::{BuildCtx, ProviderFn};
use crate::invoke::{InvokeFn, InvokeSlot};
use crate::key::Key;

/// Category of node being assembled. Options may branch on this (repo
/// locking, API surface) before the graph exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    /// Full node with the complete subsystem set.
    #[default]
    Full,
    /// Worker node assembled for a single task.
    Worker,
}

/// Outcome of a registration: first write, or replacement of an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The key had no prior constructor.
    First,
    /// An earlier constructor was replaced (last write wins).
    Replaced,
}

/// Accumulator for all constructors, startup actions and flags contributed
/// by the option pipeline.
pub struct Settings {
    providers: HashMap<Key, ProviderFn>,
    invokes: Vec<InvokeSlot>,
    /// Category of node being assembled; set by API options.
    pub node_kind: NodeKind,
    /// Set once networking options have been applied.
    pub online: bool,
    /// Set once the configuration option has been applied. Networking
    /// options guard on this to enforce their ordering.
    pub config_applied: bool,
}

impl Settings {
    /// Fresh settings with `invoke_slots` declared ordinals, all empty.
    #[must_use]
    pub fn new(invoke_slots: usize) -> Self {
        let mut invokes = Vec::with_capacity(invoke_slots);
        invokes.resize_with(invoke_slots, || InvokeSlot::Empty);
        Self {
            providers: HashMap::new(),
            invokes,
            node_kind: NodeKind::default(),
            online: false,
            config_applied: false,
        }
    }

    /// Register a constructor under `key`, replacing any earlier one.
    pub(crate) fn register(&mut self, key: Key, build: ProviderFn) -> Registration {
        match self.providers.insert(key, build) {
            None => {
                trace!(key = %key, "registered constructor");
                Registration::First
            }
            Some(_) => {
                debug!(key = %key, "overrode constructor");
                Registration::Replaced
            }
        }
    }

    /// Fill the invoke slot at `ordinal` with a named startup action,
    /// replacing any earlier occupant. Fails if `ordinal` is outside the
    /// declared range.
    pub fn set_invoke<F>(
        &mut self,
        ordinal: usize,
        name: &'static str,
        action: F,
    ) -> Result<Registration, AssemblyError>
    where
        F: FnOnce(&mut BuildCtx) -> Result<(), DynError> + Send + 'static,
    {
        let declared = self.invokes.len();
        let Some(slot) = self.invokes.get_mut(ordinal) else {
            return Err(AssemblyError::OrdinalOutOfRange { ordinal, declared });
        };

        let replaced = slot.is_filled();
        if replaced {
            debug!(ordinal, name, "overrode startup action");
        } else {
            trace!(ordinal, name, "registered startup action");
        }
        *slot = InvokeSlot::Run {
            name,
            action: Box::new(action),
        };
        Ok(if replaced {
            Registration::Replaced
        } else {
            Registration::First
        })
    }

    /// Whether a constructor is registered under `key`.
    #[must_use]
    pub fn is_registered(&self, key: Key) -> bool {
        self.providers.contains_key(&key)
    }

    /// Number of registered constructors.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Number of declared invoke ordinals.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.invokes.len()
    }

    /// Whether the slot at `ordinal` has been filled.
    #[must_use]
    pub fn is_filled(&self, ordinal: usize) -> bool {
        self.invokes
            .get(ordinal)
            .map(InvokeSlot::is_filled)
            .unwrap_or(false)
    }

    /// Consume the settings into the constructor map and the ordered invoke
    /// sequence. Called exactly once, by the assembler.
    pub(crate) fn into_parts(self) -> (HashMap<Key, ProviderFn>, Vec<InvokeSlot>) {
        (self.providers, self.invokes)
    }
}

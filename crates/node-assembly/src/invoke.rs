//! # Invoke Slots
//!
//! Startup actions occupy a closed, contiguous range of ordinals declared by
//! the consumer (an enum, by convention). Every slot starts out [`Empty`] —
//! a real tagged no-op, never an absent callable — so the assembler runs the
//! whole range without special-casing missing entries.
//!
//! Filled slots run in ascending ordinal order. The synchronous portion of
//! slot N completes before slot N+1 starts; background work an action spawns
//! is only enqueued, never awaited.
//!
//! [`Empty`]: InvokeSlot::Empty

use crate::error::DynError;
use crate::graph::BuildCtx;

/// Boxed startup action. Receives the built graph to resolve its inputs and
/// returns only an optional error.
pub(crate) type InvokeFn = Box<dyn FnOnce(&mut BuildCtx) -> Result<(), DynError> + Send>;

/// One ordinal position in the startup sequence.
pub(crate) enum InvokeSlot {
    /// Declared but unfilled; runs as a no-op.
    Empty,
    /// Filled with a named startup action.
    Run {
        name: &'static str,
        action: InvokeFn,
    },
}

impl InvokeSlot {
    pub(crate) fn is_filled(&self) -> bool {
        matches!(self, Self::Run { .. })
    }
}

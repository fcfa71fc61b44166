//! # Node Assembly
//!
//! Declarative composition and lifecycle assembly for node services.
//!
//! Independent pieces of a service are expressed as self-contained,
//! composable [`NodeOption`]s. Each option contributes constructors and/or
//! ordered startup actions into a shared [`Settings`] accumulator; the
//! [`assemble`] call then resolves the accumulated registry into a live
//! service graph, runs the startup actions in ordinal order, and returns a
//! single one-shot [`StopHandle`].
//!
//! ## Composition Rules
//!
//! - Options apply strictly in sequence against one `Settings` value; the
//!   first error aborts the whole assembly.
//! - Constructor registration is replace-on-write: later options (caller
//!   customizations, test doubles) silently supersede earlier defaults.
//!   Replacements are still reported distinctly in logs.
//! - Startup actions occupy a closed ordinal range; unfilled ordinals run as
//!   tagged no-ops.
//! - Every constructor may pair its value with a teardown action; teardowns
//!   run in reverse acquisition order when the stop handle is consumed, and
//!   on the failure path before the error is returned.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

mod assembler;
mod error;
mod graph;
mod invoke;
mod key;
mod option;
mod settings;
mod stop;

pub use assembler::assemble;
pub use error::{AssemblyError, DynError, StopError, TeardownError};
pub use graph::{BuildCtx, Built};
pub use key::Key;
pub use option::{apply_if, fail, options, override_key, provide, NodeOption};
pub use settings::{NodeKind, Registration, Settings};
pub use stop::{StopHandle, TeardownFn};

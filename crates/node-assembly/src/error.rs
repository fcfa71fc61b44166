//! # Assembly Errors
//!
//! Error taxonomy for the assembly pipeline:
//!
//! - **Composition** errors surface while the option sequence is applied;
//!   nothing has been constructed yet.
//! - **Resolution** errors (`MissingProvider`, `Cycle`, `Provider`) surface
//!   while the service graph is built; partially acquired resources are
//!   released before the error is returned.
//! - **Invocation** errors surface while startup actions run and are treated
//!   like resolution errors.
//! - **Shutdown** errors (`StopError`) are reported by the stop handle and
//!   never retried.

use std::fmt;

use thiserror::Error;

/// Boxed error type carried by constructors, startup actions and teardowns.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while applying options, building the service graph, or
/// running startup actions.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// An option failed while the sequence was applied. This covers the
    /// explicit failing combinator as well as domain errors raised inside
    /// option closures.
    #[error("{0}")]
    Composition(DynError),

    /// A constructor or startup action required a value no provider was
    /// registered for.
    #[error("no provider registered for `{wanted}` (required by `{required_by}`)")]
    MissingProvider {
        /// Type name of the missing value.
        wanted: &'static str,
        /// Name of the constructor or action that asked for it.
        required_by: String,
    },

    /// Constructors form a dependency cycle.
    #[error("dependency cycle detected: {path}")]
    Cycle {
        /// The resolution path that closed the cycle.
        path: String,
    },

    /// A registered constructor returned an error.
    #[error("constructor for `{key}` failed: {source}")]
    Provider {
        /// Registry key of the failing constructor.
        key: &'static str,
        #[source]
        source: DynError,
    },

    /// A startup action returned an error.
    #[error("startup action `{name}` failed: {source}")]
    Invoke {
        /// Name of the failing invoke slot.
        name: &'static str,
        #[source]
        source: DynError,
    },

    /// An invoke ordinal was outside the declared `[0, N)` range.
    #[error("invoke ordinal {ordinal} is outside the declared range 0..{declared}")]
    OrdinalOutOfRange {
        /// The offending ordinal.
        ordinal: usize,
        /// Number of declared slots.
        declared: usize,
    },
}

impl AssemblyError {
    /// Wrap a domain error raised while an option was applied.
    pub fn composition(err: impl Into<DynError>) -> Self {
        Self::Composition(err.into())
    }
}

/// A single resource release failure, reported by [`StopError`].
#[derive(Debug, Error)]
#[error("releasing `{name}` failed: {source}")]
pub struct TeardownError {
    /// Registry key of the resource that failed to release.
    pub name: &'static str,
    #[source]
    pub source: DynError,
}

/// Aggregated shutdown failure. Every teardown runs regardless of earlier
/// failures; all release errors are collected here rather than only the first.
#[derive(Debug)]
pub struct StopError {
    failures: Vec<TeardownError>,
}

impl StopError {
    pub(crate) fn new(failures: Vec<TeardownError>) -> Self {
        Self { failures }
    }

    /// The individual release failures, in the order they occurred
    /// (reverse acquisition order).
    pub fn failures(&self) -> &[TeardownError] {
        &self.failures
    }
}

impl fmt::Display for StopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shutdown completed with {} error(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for StopError {}

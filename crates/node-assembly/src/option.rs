//! # Option Algebra
//!
//! A [`NodeOption`] is a single-shot mutation of a [`Settings`] value that
//! may fail. Options compose by sequencing ([`options`]), conditional
//! application ([`apply_if`]) and explicit failure ([`fail`]); constructors
//! are contributed through [`provide`] and [`override_key`].
//!
//! Options apply strictly in sequence against the same `Settings` instance,
//! so a predicate always observes the effects of every option applied before
//! it. Sequencing short-circuits on the first error.

use crate::error::{AssemblyError, DynError};
use crate::graph::{BuildCtx, Built, ProviderFn};
use crate::key::Key;
use crate::settings::Settings;

/// A composable unit of configuration: applied once, mutates the settings,
/// may fail.
pub struct NodeOption(OptionFn);

type OptionFn = Box<dyn FnOnce(&mut Settings) -> Result<(), AssemblyError> + Send>;

impl NodeOption {
    /// Wrap a closure as an option.
    pub fn new<F>(apply: F) -> Self
    where
        F: FnOnce(&mut Settings) -> Result<(), AssemblyError> + Send + 'static,
    {
        Self(Box::new(apply))
    }

    /// Apply this option to `settings`.
    pub fn apply(self, settings: &mut Settings) -> Result<(), AssemblyError> {
        (self.0)(settings)
    }
}

/// Sequence options: apply each to the same settings, left to right,
/// stopping at the first error.
pub fn options<I>(opts: I) -> NodeOption
where
    I: IntoIterator<Item = NodeOption>,
{
    let opts: Vec<NodeOption> = opts.into_iter().collect();
    NodeOption::new(move |settings| {
        for opt in opts {
            opt.apply(settings)?;
        }
        Ok(())
    })
}

/// Apply `opt` only if `pred` holds against the settings state at the point
/// of application. Ordering with other options is significant: the predicate
/// sees exactly what earlier options left behind.
pub fn apply_if<P>(pred: P, opt: NodeOption) -> NodeOption
where
    P: FnOnce(&Settings) -> bool + Send + 'static,
{
    NodeOption::new(move |settings| {
        if pred(settings) {
            opt.apply(settings)
        } else {
            Ok(())
        }
    })
}

/// An option that unconditionally fails with `err`. Combined with
/// [`apply_if`] this turns cross-option invariants ("networking before
/// config") into data instead of assertions buried in unrelated code.
pub fn fail(err: impl Into<DynError>) -> NodeOption {
    let err = err.into();
    NodeOption::new(move |_| Err(AssemblyError::Composition(err)))
}

/// Register a constructor for `T` under its type key. A later `provide` for
/// the same type replaces this one — deliberately, so test doubles and
/// caller customizations can supersede defaults without ceremony.
pub fn provide<T, F>(ctor: F) -> NodeOption
where
    T: Send + Sync + 'static,
    F: FnOnce(&mut BuildCtx) -> Result<Built<T>, DynError> + Send + 'static,
{
    let key = Key::of::<T>();
    register(key, move |ctx| {
        let built = ctor(ctx).map_err(|source| AssemblyError::Provider {
            key: key.name(),
            source,
        })?;
        ctx.store(key, built);
        Ok(())
    })
}

/// Register an effect constructor under an explicit (sentinel) key. The
/// constructor runs during assembly like any other; its output is not
/// addressable, but a teardown it returns is still collected. Registering
/// under an occupied key replaces the earlier constructor.
pub fn override_key<F>(key: Key, ctor: F) -> NodeOption
where
    F: FnOnce(&mut BuildCtx) -> Result<Built<()>, DynError> + Send + 'static,
{
    register(key, move |ctx| {
        let built = ctor(ctx).map_err(|source| AssemblyError::Provider {
            key: key.name(),
            source,
        })?;
        if let Some(action) = built.teardown {
            ctx.push_teardown(key.name(), action);
        }
        Ok(())
    })
}

fn register<F>(key: Key, build: F) -> NodeOption
where
    F: FnOnce(&mut BuildCtx) -> Result<(), AssemblyError> + Send + 'static,
{
    NodeOption::new(move |settings| {
        let boxed: ProviderFn = Box::new(build);
        settings.register(key, boxed);
        Ok(())
    })
}

//! # Assembler
//!
//! Drives one complete assembly: apply the composed options to a fresh
//! [`Settings`], build the service graph from the accumulated constructors,
//! run the startup actions in ordinal order, and hand back the one-shot
//! [`StopHandle`].
//!
//! The state machine is forward-only: options applied, graph built, running,
//! stopped. A failed call cannot be retried — compose the options again and
//! assemble from scratch. Failure before the running state never leaves
//! anything behind: partially acquired resources are unwound before the
//! error is returned.

use tracing::{debug, info, trace};

use crate::error::AssemblyError;
use crate::graph::BuildCtx;
use crate::invoke::InvokeSlot;
use crate::option::{options, NodeOption};
use crate::settings::Settings;
use crate::stop::StopHandle;

/// Assemble and start a node from composed options.
///
/// `invoke_slots` declares the closed ordinal range `[0, N)` for startup
/// actions; unfilled slots run as no-ops. The returned future never imposes
/// its own timeout — callers race it against their own deadline if they need
/// one.
pub async fn assemble<I>(invoke_slots: usize, opts: I) -> Result<StopHandle, AssemblyError>
where
    I: IntoIterator<Item = NodeOption>,
{
    // Phase 1: apply the option sequence. A failure here is pure: nothing
    // has been constructed yet.
    let mut settings = Settings::new(invoke_slots);
    options(opts).apply(&mut settings)?;
    debug!(
        providers = settings.provider_count(),
        slots = settings.slot_count(),
        "options applied"
    );

    // Phase 2: build every registered constructor. Registration order is
    // irrelevant; dependencies resolve recursively by type.
    let (providers, invokes) = settings.into_parts();
    let mut ctx = BuildCtx::new(providers);
    if let Err(err) = ctx.build_all() {
        ctx.unwind().await;
        return Err(err);
    }

    // Phase 3: run startup actions in ascending ordinal order. The
    // synchronous portion of each action completes before the next starts.
    for (ordinal, slot) in invokes.into_iter().enumerate() {
        match slot {
            InvokeSlot::Empty => trace!(ordinal, "invoke slot unfilled, no-op"),
            InvokeSlot::Run { name, action } => {
                if let Err(err) = ctx.run_invoke(name, action) {
                    ctx.unwind().await;
                    return Err(err);
                }
            }
        }
    }

    let handle = StopHandle::new(ctx.into_teardowns());
    info!(
        resources = handle.resource_count(),
        "node assembled and started"
    );
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::DynError;
    use crate::graph::{BuildCtx, Built};
    use crate::option::{apply_if, fail, override_key, provide};
    use crate::key::Key;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, entry: &str) {
        log.lock().unwrap().push(entry.to_string());
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn invoke_at<F>(ordinal: usize, name: &'static str, action: F) -> NodeOption
    where
        F: FnOnce(&mut BuildCtx) -> Result<(), DynError> + Send + 'static,
    {
        NodeOption::new(move |settings| settings.set_invoke(ordinal, name, action).map(|_| ()))
    }

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for Boom {}

    struct Tracker;
    struct Gate;

    #[tokio::test]
    async fn test_assemble_then_stop_is_clean() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let l1 = log.clone();
        let l2 = log.clone();

        let handle = assemble(
            2,
            [
                provide::<Tracker, _>(move |_| {
                    Ok(Built::with_teardown(Tracker, move || async move {
                        record(&l1, "released");
                        Ok(())
                    }))
                }),
                invoke_at(0, "probe", move |ctx| {
                    ctx.require::<Tracker>()?;
                    record(&l2, "probed");
                    Ok(())
                }),
            ],
        )
        .await
        .unwrap();

        assert_eq!(handle.resource_count(), 1);
        handle.stop().await.unwrap();
        assert_eq!(entries(&log), vec!["probed", "released"]);
    }

    #[tokio::test]
    async fn test_fail_anywhere_aborts_and_no_invoke_runs() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();

        let err = assemble(
            1,
            [
                invoke_at(0, "never", move |_| {
                    record(&l, "invoked");
                    Ok(())
                }),
                fail(Boom),
            ],
        )
        .await
        .unwrap_err();

        match err {
            AssemblyError::Composition(inner) => {
                assert!(inner.downcast_ref::<Boom>().is_some(), "error must be the injected one");
            }
            other => panic!("expected composition error, got {other}"),
        }
        assert!(entries(&log).is_empty(), "no invocation may run after a failed composition");
    }

    #[tokio::test]
    async fn test_second_override_wins() {
        struct PriceFloor(u64);

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();

        assemble(
            1,
            [
                provide::<PriceFloor, _>(|_| Ok(Built::plain(PriceFloor(1)))),
                provide::<PriceFloor, _>(|_| Ok(Built::plain(PriceFloor(7)))),
                invoke_at(0, "read-floor", move |ctx| {
                    let floor = ctx.require::<PriceFloor>()?;
                    record(&l, &floor.0.to_string());
                    Ok(())
                }),
            ],
        )
        .await
        .unwrap();

        assert_eq!(entries(&log), vec!["7"]);
    }

    #[tokio::test]
    async fn test_guard_fires_only_after_flag_is_set() {
        // Guard ahead of the flag-setting option: predicate sees "unset".
        let ok = assemble(
            0,
            [
                apply_if(|s| s.online, fail("online set too early")),
                NodeOption::new(|s| {
                    s.online = true;
                    Ok(())
                }),
            ],
        )
        .await;
        assert!(ok.is_ok());

        // Guard after the flag-setting option: predicate sees "set".
        let err = assemble(
            0,
            [
                NodeOption::new(|s| {
                    s.online = true;
                    Ok(())
                }),
                apply_if(|s| s.online, fail("online set too early")),
            ],
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "online set too early");
    }

    #[tokio::test]
    async fn test_partial_ordinal_fill_runs_in_ascending_order() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let la = log.clone();
        let lb = log.clone();

        // Registered out of order on purpose; ordinal 2 stays unfilled.
        let handle = assemble(
            3,
            [
                invoke_at(1, "append-b", move |_| {
                    record(&lb, "B");
                    Ok(())
                }),
                invoke_at(0, "append-a", move |_| {
                    record(&la, "A");
                    Ok(())
                }),
            ],
        )
        .await
        .unwrap();

        assert_eq!(entries(&log), vec!["A", "B"]);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_dependency_is_a_resolution_error() {
        struct NeedsGate;

        let err = assemble(
            0,
            [provide::<NeedsGate, _>(|ctx| {
                ctx.require::<Gate>()?;
                Ok(Built::plain(NeedsGate))
            })],
        )
        .await
        .unwrap_err();

        let rendered = err.to_string();
        assert!(matches!(err, AssemblyError::Provider { .. }));
        assert!(rendered.contains("NeedsGate"));

        let mut source = std::error::Error::source(&err);
        let mut found_missing = false;
        while let Some(inner) = source {
            if inner.to_string().contains("no provider registered") {
                found_missing = true;
            }
            source = inner.source();
        }
        assert!(found_missing, "cause chain must name the missing provider");
    }

    #[tokio::test]
    async fn test_dependency_cycle_is_detected() {
        struct Left;
        struct Right;

        let err = assemble(
            0,
            [
                provide::<Left, _>(|ctx| {
                    ctx.require::<Right>()?;
                    Ok(Built::plain(Left))
                }),
                provide::<Right, _>(|ctx| {
                    ctx.require::<Left>()?;
                    Ok(Built::plain(Right))
                }),
            ],
        )
        .await
        .unwrap_err();

        let mut cycle = false;
        let mut source: Option<&dyn std::error::Error> = Some(&err);
        while let Some(inner) = source {
            if inner.to_string().contains("dependency cycle") {
                cycle = true;
            }
            source = inner.source();
        }
        assert!(cycle, "expected a cycle error somewhere in the chain, got {err}");
    }

    #[tokio::test]
    async fn test_constructor_failure_unwinds_acquired_resources() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();

        let err = assemble(
            0,
            [
                provide::<Tracker, _>(move |_| {
                    Ok(Built::with_teardown(Tracker, move || async move {
                        record(&l, "tracker-released");
                        Ok(())
                    }))
                }),
                provide::<Gate, _>(|ctx| {
                    // Depend on the tracker first so it is acquired before the
                    // failure, regardless of registry iteration order.
                    ctx.require::<Tracker>()?;
                    Err("gate refused".into())
                }),
            ],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AssemblyError::Provider { .. }));
        assert_eq!(entries(&log), vec!["tracker-released"]);
    }

    #[tokio::test]
    async fn test_invoke_failure_unwinds_acquired_resources() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();

        let err = assemble(
            1,
            [
                provide::<Tracker, _>(move |_| {
                    Ok(Built::with_teardown(Tracker, move || async move {
                        record(&l, "tracker-released");
                        Ok(())
                    }))
                }),
                invoke_at(0, "refuse", |ctx| {
                    ctx.require::<Tracker>()?;
                    Err("startup refused".into())
                }),
            ],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AssemblyError::Invoke { name: "refuse", .. }));
        assert_eq!(entries(&log), vec!["tracker-released"]);
    }

    #[tokio::test]
    async fn test_stop_releases_in_reverse_and_reports_every_failure() {
        struct First;
        struct Second;

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let l1 = log.clone();
        let l2 = log.clone();

        let handle = assemble(
            0,
            [
                provide::<First, _>(move |_| {
                    Ok(Built::with_teardown(First, move || async move {
                        record(&l1, "first");
                        Err("first failed".into())
                    }))
                }),
                provide::<Second, _>(move |ctx| {
                    // Acquired after First by construction.
                    ctx.require::<First>()?;
                    Ok(Built::with_teardown(Second, move || async move {
                        record(&l2, "second");
                        Err("second failed".into())
                    }))
                }),
            ],
        )
        .await
        .unwrap();

        let err = handle.stop().await.unwrap_err();
        assert_eq!(err.failures().len(), 2, "all release errors are reported");
        assert_eq!(entries(&log), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_effect_constructors_run_and_can_hold_teardowns() {
        const PROBE_KEY: Key = Key::sentinel(9, "probe-effect");

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let built = log.clone();
        let released = log.clone();

        let handle = assemble(
            0,
            [override_key(PROBE_KEY, move |_| {
                record(&built, "effect-built");
                Ok(Built::with_teardown((), move || async move {
                    record(&released, "effect-released");
                    Ok(())
                }))
            })],
        )
        .await
        .unwrap();

        handle.stop().await.unwrap();
        assert_eq!(entries(&log), vec!["effect-built", "effect-released"]);
    }

    #[tokio::test]
    async fn test_empty_assembly_succeeds() {
        let handle = assemble(0, []).await.unwrap();
        assert_eq!(handle.resource_count(), 0);
        handle.stop().await.unwrap();
    }
}

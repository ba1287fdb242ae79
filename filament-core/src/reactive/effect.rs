//! Effect implementation.
//!
//! An Effect is a side-effecting computation that runs immediately and
//! re-runs whenever any cell it read changes.
//!
//! # How effects work
//!
//! 1. When created, the effect runs its body inside a tracking scope to
//!    establish initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs synchronously: the
//!    previous cleanup (if the body returned one) runs first, old
//!    dependencies are cleared, and the body runs in a fresh scope.
//!
//! 3. `dispose()` makes further notifications no-ops and runs the last
//!    cleanup.
//!
//! Body and cleanup panics are caught and logged; they never interrupt
//! notification of other subscribers.
//!
//! # Re-entrancy
//!
//! The model is synchronous and cooperative: an effect that writes one of
//! its own dependencies triggers itself recursively. There is deliberately
//! no recursion guard; convergence is the caller's responsibility (the
//! equal-write suppression on cells is usually what terminates the
//! recursion).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::context::{ScopeKind, TrackingScope};
use super::ids::SubscriberId;
use super::runtime::{panic_message, Reactive, Runtime};

/// Cleanup closure returned by an effect body.
pub type Cleanup = Box<dyn FnOnce() + Send>;

struct EffectInner {
    subscriber_id: SubscriberId,
    body: Box<dyn Fn() -> Option<Cleanup> + Send + Sync>,
    cleanup: Mutex<Option<Cleanup>>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

/// A side-effecting computation re-run on dependency changes.
///
/// Dropping the last handle stops re-runs (the runtime holds only a weak
/// reference) but does not run the final cleanup; call [`Effect::dispose`]
/// for deterministic teardown.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// let count_clone = count.clone();
/// let effect = Effect::new(move || {
///     println!("count is {}", count_clone.read());
/// });
///
/// count.write(5); // prints: count is 5
/// effect.dispose();
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create an effect with no cleanup. Runs immediately.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Box::new(move || {
            body();
            None
        }))
    }

    /// Create an effect whose body returns a cleanup closure.
    ///
    /// The cleanup runs before each re-run and on disposal. Runs
    /// immediately.
    pub fn with_cleanup<F, C>(body: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::build(Box::new(move || Some(Box::new(body()) as Cleanup)))
    }

    fn build(body: Box<dyn Fn() -> Option<Cleanup> + Send + Sync>) -> Self {
        let inner = Arc::new(EffectInner {
            subscriber_id: SubscriberId::new(),
            body,
            cleanup: Mutex::new(None),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });

        let reactive: Arc<dyn Reactive> = inner.clone();
        Runtime::register(Arc::downgrade(&reactive));

        inner.execute();
        Self { inner }
    }

    /// Get the subscriber ID this effect uses for dependency tracking.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Mark the effect inactive and run the last cleanup.
    ///
    /// Further dependency notifications become no-ops.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        Runtime::unregister(self.inner.subscriber_id);
        self.inner.run_cleanup();
    }

    /// Check whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the body has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        self.run_cleanup();

        // Stale dependencies from the prior run are not retained.
        Runtime::clear_dependencies(self.subscriber_id);

        self.run_count.fetch_add(1, Ordering::SeqCst);

        let result = {
            let _scope = TrackingScope::enter(ScopeKind::Computation(self.subscriber_id));
            catch_unwind(AssertUnwindSafe(|| (self.body)()))
        };

        match result {
            Ok(new_cleanup) => {
                *self.cleanup.lock() = new_cleanup;
            }
            Err(payload) => {
                warn!(
                    subscriber = self.subscriber_id.raw(),
                    error = %panic_message(payload.as_ref()),
                    "effect body panicked"
                );
            }
        }
    }

    fn run_cleanup(&self) {
        let cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(cleanup)) {
                warn!(
                    subscriber = self.subscriber_id.raw(),
                    error = %panic_message(payload.as_ref()),
                    "effect cleanup panicked"
                );
            }
        }
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_dirty(&self) {}

    fn schedule(&self) {
        self.execute();
    }

    fn is_eager(&self) -> bool {
        true
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("subscriber", &self.inner.subscriber_id)
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::signal::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn runs_immediately() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn reruns_when_dependency_changes() {
        let signal = Signal::new(0);
        let observed = Arc::new(AtomicI32::new(-1));

        let signal_clone = signal.clone();
        let observed_clone = observed.clone();
        let effect = Effect::new(move || {
            observed_clone.store(signal_clone.read(), Ordering::SeqCst);
        });

        assert_eq!(observed.load(Ordering::SeqCst), 0);

        signal.write(42);
        assert_eq!(observed.load(Ordering::SeqCst), 42);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn cleanup_runs_before_each_rerun_and_on_dispose() {
        let signal = Signal::new(0);
        let cleanups = Arc::new(AtomicI32::new(0));

        let signal_clone = signal.clone();
        let cleanups_clone = cleanups.clone();
        let effect = Effect::with_cleanup(move || {
            let _ = signal_clone.read();
            let counter = cleanups_clone.clone();
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        signal.write(1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        effect.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disposed_effect_ignores_changes() {
        let signal = Signal::new(0);
        let runs = Arc::new(AtomicI32::new(0));

        let signal_clone = signal.clone();
        let runs_clone = runs.clone();
        let effect = Effect::new(move || {
            let _ = signal_clone.read();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        effect.dispose();
        assert!(effect.is_disposed());

        signal.write(1);
        signal.write(2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_dependencies_are_dropped_on_rerun() {
        let flag = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(10);
        let runs = Arc::new(AtomicI32::new(0));

        let (flag_c, a_c, b_c) = (flag.clone(), a.clone(), b.clone());
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            if flag_c.read() {
                let _ = a_c.read();
            } else {
                let _ = b_c.read();
            }
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);

        flag.write(false);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // `a` is no longer read; changing it must not re-run the effect.
        a.write(5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        b.write(20);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn self_write_recurses_until_convergence() {
        let counter = Signal::new(0);

        let counter_clone = counter.clone();
        let effect = Effect::new(move || {
            let value = counter_clone.read();
            if value < 3 {
                counter_clone.write(value + 1);
            }
        });

        // 0 -> 1 -> 2 -> 3, plus the final run that observes 3.
        assert_eq!(counter.read(), 3);
        assert_eq!(effect.run_count(), 4);
    }

    #[test]
    fn panicking_body_is_contained() {
        let signal = Signal::new(0);
        let signal_clone = signal.clone();
        let effect = Effect::new(move || {
            if signal_clone.read() == 1 {
                panic!("boom");
            }
        });

        signal.write(1);
        // The panic was swallowed and the effect keeps running.
        signal.write(2);
        assert_eq!(effect.run_count(), 3);
    }
}

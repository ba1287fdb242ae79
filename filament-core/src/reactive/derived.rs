//! Derived cell implementation.
//!
//! A Derived is a read-only cell computed from other cells, cached until a
//! dependency changes.
//!
//! # How derived cells work
//!
//! 1. The compute function does not run at construction; the cell starts
//!    dirty and computes on first read.
//!
//! 2. Reading a clean derived cell returns the cached value. Reading a dirty
//!    one re-runs the compute function inside a fresh tracking scope, so the
//!    cells it touches in *this* run become the new upstream set. Stale
//!    upstream registrations are actively removed first, which keeps
//!    branch-dependent dependency sets correct across recomputations.
//!
//! 3. When an upstream cell changes, the runtime flips this cell's dirty
//!    flag. The clean→dirty transition notifies this cell's own subscribers
//!    and cascades through the runtime, so effects and components depending
//!    on the derived value also refresh. Invalidation is eager,
//!    recomputation stays lazy.
//!
//! A derived cell that (transitively) reads itself is a programmer error; a
//! recursion-depth guard turns the infinite recomputation into a panic with
//! a clear message instead of a stack overflow.

use std::cell::Cell;
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use super::context::{ScopeKind, TrackingScope};
use super::ids::{CellId, SubscriberId, SubscriptionId};
use super::runtime::{panic_message, Reactive, Runtime};

/// Recomputations may nest (a derived reading another derived) but a chain
/// deeper than this is assumed to be a dependency cycle.
const MAX_RECOMPUTE_DEPTH: usize = 256;

thread_local! {
    static RECOMPUTE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

type InvalidateCallback = Arc<dyn Fn() + Send + Sync>;

struct DerivedInner<T> {
    id: CellId,
    subscriber_id: SubscriberId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    dirty: AtomicBool,
    /// Explicit subscribers, notified on invalidation, in subscription order.
    subscribers: RwLock<Vec<(SubscriptionId, InvalidateCallback)>>,
}

/// A read-only cell whose value is computed from other cells and cached
/// until a dependency invalidates it.
///
/// There is deliberately no `write` method; the membrane layer surfaces
/// write attempts on derived-backed fields as [`Error::ReadOnly`]
/// (`crate::error::Error`).
pub struct Derived<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<DerivedInner<T>>,
}

impl<T> Derived<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new derived cell. The computation runs on first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(DerivedInner {
            id: CellId::new(),
            subscriber_id: SubscriberId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            dirty: AtomicBool::new(true),
            subscribers: RwLock::new(Vec::new()),
        });

        let reactive: Arc<dyn Reactive> = inner.clone();
        Runtime::register(Arc::downgrade(&reactive));

        Self { inner }
    }

    /// Get the derived cell's cell ID.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Get the subscriber ID this cell uses for upstream tracking.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Read the value, recomputing first if a dependency changed.
    ///
    /// Registers this cell as a dependency of the current tracking scope,
    /// exactly like a signal read.
    pub fn read(&self) -> T {
        Runtime::track_read(self.inner.id);

        if self.inner.dirty.load(Ordering::SeqCst) {
            return self.recompute();
        }
        let cached = self.inner.value.read().clone();
        match cached {
            Some(value) => value,
            None => self.recompute(),
        }
    }

    /// Get the cached value without recomputing or tracking.
    ///
    /// Returns `None` if the cell has never been computed.
    pub fn peek(&self) -> Option<T> {
        self.inner.value.read().clone()
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    fn recompute(&self) -> T {
        // Depth guard restores the counter even if the compute fn panics.
        struct DepthGuard;
        impl Drop for DepthGuard {
            fn drop(&mut self) {
                RECOMPUTE_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
            }
        }

        let depth = RECOMPUTE_DEPTH.with(|d| {
            let depth = d.get() + 1;
            d.set(depth);
            depth
        });
        let _depth_guard = DepthGuard;
        assert!(
            depth <= MAX_RECOMPUTE_DEPTH,
            "derived cell recomputation exceeded depth {}: \
             a derived cell most likely depends on itself",
            MAX_RECOMPUTE_DEPTH
        );

        // Drop upstream registrations from the previous run so dependencies
        // no longer touched cannot spuriously retrigger this cell.
        Runtime::clear_dependencies(self.inner.subscriber_id);

        let new_value = {
            let _scope =
                TrackingScope::enter(ScopeKind::Computation(self.inner.subscriber_id));
            (self.inner.compute)()
        };

        *self.inner.value.write() = Some(new_value.clone());
        self.inner.dirty.store(false, Ordering::SeqCst);

        new_value
    }

    /// Register a callback invoked when this cell is invalidated.
    ///
    /// The callback fires once per clean→dirty transition; the new value is
    /// not computed until somebody reads it.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.inner
            .subscribers
            .write()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber registered with [`Derived::subscribe`] or
    /// [`Derived::watch`].
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .subscribers
            .write()
            .retain(|(sub_id, _)| *sub_id != id);
    }

    /// Register a callback receiving `(new, old)` values.
    ///
    /// Forces an initial computation to seed the old value, and forces
    /// recomputation on each invalidation to produce the new one. Use
    /// [`Derived::subscribe`] to observe invalidation without breaking
    /// laziness.
    pub fn watch<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let previous = Mutex::new(self.read());
        let this = self.clone();
        self.subscribe(move || {
            let new = this.read();
            let mut prev = previous.lock();
            if new != *prev {
                callback(&new, &prev);
                *prev = new;
            }
        })
    }

    /// Get the number of explicit subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

impl<T> Reactive for DerivedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_dirty(&self) {
        // Only the clean→dirty transition propagates. While already dirty,
        // further upstream changes are absorbed; this also guards against
        // notification cycles.
        if self.dirty.swap(true, Ordering::SeqCst) {
            return;
        }

        let callbacks: Vec<InvalidateCallback> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback())) {
                warn!(
                    cell = self.id.raw(),
                    error = %panic_message(payload.as_ref()),
                    "derived subscriber panicked; continuing with remaining subscribers"
                );
            }
        }

        // Behave like a changed cell toward downstream readers.
        Runtime::notify_cell_change(self.id);
    }

    fn schedule(&self) {
        // Lazy: recomputation happens on next read.
    }

    fn is_eager(&self) -> bool {
        false
    }
}

impl<T> Clone for Derived<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Derived<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

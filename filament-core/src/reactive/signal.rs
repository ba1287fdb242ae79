//! Signal implementation.
//!
//! A Signal is the fundamental reactive primitive: an observable single-value
//! holder with a subscriber set.
//!
//! # How signals work
//!
//! 1. When a signal is read within a tracking scope (derived cell, effect,
//!    or component render), the signal registers that reader through the
//!    runtime's dependency tables.
//!
//! 2. When a signal's value changes, explicit subscribers run synchronously
//!    in subscription order, then the runtime propagates the change to
//!    dependent computations and finally consults the redraw-dispatch hook.
//!
//! 3. Writing a value equal to the current one (by `PartialEq`) notifies
//!    nobody.
//!
//! # Thread safety
//!
//! The value itself is behind a `parking_lot::RwLock` so signal handles can
//! be cloned and stored freely. Dependency propagation is thread-local; the
//! reactive model is single-threaded and cooperative.

use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use super::ids::{CellId, SubscriptionId};
use super::runtime::{panic_message, Runtime};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SignalInner<T> {
    id: CellId,
    value: RwLock<T>,
    /// Explicit subscribers, in subscription order.
    subscribers: RwLock<Vec<(SubscriptionId, Callback<T>)>>,
}

/// A reactive cell holding a value of type `T`.
///
/// Cloning a `Signal` produces another handle to the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let value = count.read(); // tracks a dependency when inside a scope
/// count.write(5);           // notifies subscribers
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

/// A non-owning handle to a signal, used for back-references that must not
/// keep the cell alive (e.g. an array membrane's owner cell).
pub struct WeakSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Weak<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: CellId::new(),
                value: RwLock::new(value),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Get the signal's cell ID.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Read the current value.
    ///
    /// If called inside a tracking scope this registers the current reader
    /// as a dependent. Never fails.
    pub fn read(&self) -> T {
        Runtime::track_read(self.inner.id);
        self.inner.value.read().clone()
    }

    /// Read the current value without registering any dependency.
    pub fn peek(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Register this cell as a dependency of the current scope without
    /// reading its value. Used for structural reads like array length.
    pub fn track(&self) {
        Runtime::track_read(self.inner.id);
    }

    /// Write a new value and notify subscribers.
    ///
    /// Writing a value equal to the current one is a no-op: no subscriber
    /// runs and the redraw hook is not consulted.
    pub fn write(&self, value: T) {
        {
            let guard = self.inner.value.read();
            if *guard == value {
                return;
            }
        }
        {
            let mut guard = self.inner.value.write();
            *guard = value.clone();
        }
        self.notify(&value);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.write(new_value);
    }

    /// Notify subscribers and the runtime without changing the value.
    ///
    /// Array membranes use this after in-place structural mutation: the
    /// owning cell's value (the membrane handle) is identical, but readers
    /// of the array must still refresh.
    pub fn touch(&self) {
        let value = self.peek();
        self.notify(&value);
    }

    fn notify(&self, value: &T) {
        // Clone the callback list out so subscribers may subscribe or
        // unsubscribe reentrantly without deadlocking.
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(value))) {
                warn!(
                    cell = self.inner.id.raw(),
                    error = %panic_message(payload.as_ref()),
                    "signal subscriber panicked; continuing with remaining subscribers"
                );
            }
        }

        Runtime::notify_cell_change(self.inner.id);
    }

    /// Register a callback invoked with the new value on every change.
    ///
    /// Returns a token that removes the callback via [`Signal::unsubscribe`].
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.inner
            .subscribers
            .write()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber registered with [`Signal::subscribe`] or
    /// [`Signal::watch`].
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .subscribers
            .write()
            .retain(|(sub_id, _)| *sub_id != id);
    }

    /// Register a callback receiving `(new, old)` on every change.
    ///
    /// Not invoked at registration time; the first invocation happens on the
    /// first change after registration.
    pub fn watch<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let previous = Mutex::new(self.peek());
        self.subscribe(move |new| {
            let mut prev = previous.lock();
            callback(new, &prev);
            *prev = new.clone();
        })
    }

    /// Get the number of explicit subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Get a non-owning handle to this signal.
    pub fn downgrade(&self) -> WeakSignal<T> {
        WeakSignal {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Identity comparison: do two handles refer to the same cell?
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> WeakSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Upgrade to a strong handle if the cell is still alive.
    pub fn upgrade(&self) -> Option<Signal<T>> {
        self.inner.upgrade().map(|inner| Signal { inner })
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Clone for WeakSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

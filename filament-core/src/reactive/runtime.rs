//! Reactive runtime.
//!
//! The runtime is the central coordinator that connects cells, derived
//! values, effects, and components. It owns the dependency tables and drives
//! update propagation when a cell changes:
//!
//! 1. When a cell is read inside a tracking scope, the runtime records the
//!    dependency (computation scopes go into the cell→subscriber table,
//!    component scopes into the bidirectional component↔cell tracker).
//!
//! 2. When a cell's value changes, the runtime marks dependent derived cells
//!    dirty (invalidation is eager, recomputation stays lazy), re-runs
//!    dependent effects synchronously, and finally invokes the installed
//!    redraw-dispatch hook once for the changed cell.
//!
//! 3. The renderer collaborator maps the hook call back to components via
//!    [`Runtime::components_for_cell`].
//!
//! All tables live in thread-local storage. The reactive model is
//! single-threaded and cooperative; a server host that runs multiple logical
//! sessions on one thread must call the explicit clear primitives between
//! requests ([`Runtime::reset`], `store::clear`).

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Weak;

use indexmap::IndexSet;
use tracing::trace;

use super::context::{ScopeKind, TrackingScope};
use super::ids::{CellId, ComponentId, SubscriberId};

/// A computation that can be notified when one of its dependencies changes.
///
/// Implemented by derived cells (lazy, `mark_dirty` propagates invalidation)
/// and effects (eager, `schedule` re-runs the body).
pub trait Reactive {
    /// Get the subscriber ID for this computation.
    fn subscriber_id(&self) -> SubscriberId;

    /// Mark this computation as needing recomputation.
    fn mark_dirty(&self);

    /// Run this computation now (effects only; no-op for derived cells).
    fn schedule(&self);

    /// Whether this computation runs eagerly on change (effect) or lazily on
    /// next read (derived cell).
    fn is_eager(&self) -> bool;
}

/// The redraw-dispatch hook installed by the renderer collaborator.
pub type RedrawHook = Rc<dyn Fn(CellId)>;

thread_local! {
    /// Subscriber ID → live computation. Weak so the tables never keep a
    /// dropped derived cell or effect alive.
    static SUBSCRIBERS: RefCell<HashMap<SubscriberId, Weak<dyn Reactive>>> =
        RefCell::new(HashMap::new());

    /// Cell → subscribers that read it, in subscription order.
    static CELL_SUBSCRIBERS: RefCell<HashMap<CellId, IndexSet<SubscriberId>>> =
        RefCell::new(HashMap::new());

    /// Component → cells it has read.
    static COMPONENT_CELLS: RefCell<HashMap<ComponentId, IndexSet<CellId>>> =
        RefCell::new(HashMap::new());

    /// Cell → components that have read it, in subscription order.
    static CELL_COMPONENTS: RefCell<HashMap<CellId, IndexSet<ComponentId>>> =
        RefCell::new(HashMap::new());

    static REDRAW_HOOK: RefCell<Option<RedrawHook>> = const { RefCell::new(None) };
}

/// The reactive runtime for the current thread.
pub struct Runtime;

/// Guard for a component render scope. Dropping it ends the render.
pub struct RenderScope {
    _scope: TrackingScope,
}

impl Runtime {
    /// Register a computation so cell changes can reach it.
    ///
    /// Callers pass a weak reference; once the computation is dropped its
    /// table entries are pruned lazily during notification.
    pub fn register(subscriber: Weak<dyn Reactive>) {
        if let Some(live) = subscriber.upgrade() {
            let id = live.subscriber_id();
            SUBSCRIBERS.with(|map| {
                map.borrow_mut().insert(id, subscriber);
            });
        }
    }

    /// Remove a computation and all its dependency edges.
    pub fn unregister(id: SubscriberId) {
        SUBSCRIBERS.with(|map| {
            map.borrow_mut().remove(&id);
        });
        Self::clear_dependencies(id);
    }

    /// Record that the current tracking scope read `cell`.
    ///
    /// Called by every cell read. Routes to the cell→subscriber table for
    /// computation scopes and to the component↔cell tracker for component
    /// scopes. A no-op outside any scope.
    pub fn track_read(cell: CellId) {
        let Some(scope) = TrackingScope::current() else {
            return;
        };
        TrackingScope::track_dependency(cell);

        match scope {
            ScopeKind::Computation(sub) => {
                CELL_SUBSCRIBERS.with(|map| {
                    map.borrow_mut().entry(cell).or_default().insert(sub);
                });
            }
            ScopeKind::Component(component) => {
                COMPONENT_CELLS.with(|map| {
                    map.borrow_mut().entry(component).or_default().insert(cell);
                });
                CELL_COMPONENTS.with(|map| {
                    map.borrow_mut().entry(cell).or_default().insert(component);
                });
            }
        }
    }

    /// Remove every dependency edge pointing at `subscriber`.
    ///
    /// Called before a computation re-runs so stale dependencies from the
    /// previous run do not retrigger it.
    pub fn clear_dependencies(subscriber: SubscriberId) {
        CELL_SUBSCRIBERS.with(|map| {
            for subs in map.borrow_mut().values_mut() {
                subs.shift_remove(&subscriber);
            }
        });
    }

    /// Propagate a committed change of `cell`.
    ///
    /// Marks dependent derived cells dirty (they cascade to their own
    /// subscribers), re-runs dependent effects synchronously, then invokes
    /// the redraw hook once for this cell.
    pub fn notify_cell_change(cell: CellId) {
        let subscriber_ids: Vec<SubscriberId> = CELL_SUBSCRIBERS.with(|map| {
            map.borrow()
                .get(&cell)
                .map(|subs| subs.iter().copied().collect())
                .unwrap_or_default()
        });

        trace!(cell = cell.raw(), subscribers = subscriber_ids.len(), "cell changed");

        // Upgrade outside the table borrow: computations triggered below may
        // re-enter the runtime.
        let mut live = Vec::with_capacity(subscriber_ids.len());
        let mut dead = Vec::new();
        SUBSCRIBERS.with(|map| {
            let map = map.borrow();
            for sub_id in subscriber_ids {
                match map.get(&sub_id).and_then(Weak::upgrade) {
                    Some(reactive) => live.push(reactive),
                    None => dead.push(sub_id),
                }
            }
        });

        for sub_id in dead {
            Self::unregister(sub_id);
        }

        // Eager invalidation: every dependent flips dirty first, then eager
        // dependents (effects) run. Derived cells stay lazy.
        for reactive in &live {
            reactive.mark_dirty();
        }
        for reactive in &live {
            if reactive.is_eager() {
                reactive.schedule();
            }
        }

        let hook = REDRAW_HOOK.with(|slot| slot.borrow().clone());
        if let Some(hook) = hook {
            hook(cell);
        }
    }

    /// Install the process-wide (per-thread) redraw-dispatch hook.
    ///
    /// The hook is invoked once per committing write or invalidation,
    /// receiving the changed cell. The renderer collaborator maps it back to
    /// components with [`Runtime::components_for_cell`].
    pub fn set_redraw_hook<F>(hook: F)
    where
        F: Fn(CellId) + 'static,
    {
        REDRAW_HOOK.with(|slot| {
            *slot.borrow_mut() = Some(Rc::new(hook));
        });
    }

    /// Remove the installed redraw hook.
    pub fn clear_redraw_hook() {
        REDRAW_HOOK.with(|slot| {
            *slot.borrow_mut() = None;
        });
    }

    /// Begin rendering `component`.
    ///
    /// Cell reads made while the returned guard is alive are associated with
    /// the component in both directions of the tracker.
    pub fn begin_render(component: ComponentId) -> RenderScope {
        // A fresh render replaces the component's previous dependency set.
        Self::clear_component(component);
        RenderScope {
            _scope: TrackingScope::enter(ScopeKind::Component(component)),
        }
    }

    /// Components that have read `cell`, in first-read order.
    pub fn components_for_cell(cell: CellId) -> Vec<ComponentId> {
        CELL_COMPONENTS.with(|map| {
            map.borrow()
                .get(&cell)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Cells read by `component` during its last render.
    pub fn cells_for_component(component: ComponentId) -> Vec<CellId> {
        COMPONENT_CELLS.with(|map| {
            map.borrow()
                .get(&component)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Remove a torn-down component from both directions of the tracker so
    /// future cell writes do not attempt to redraw it.
    pub fn dispose_component(component: ComponentId) {
        Self::clear_component(component);
    }

    fn clear_component(component: ComponentId) {
        let cells: Vec<CellId> = COMPONENT_CELLS.with(|map| {
            map.borrow_mut()
                .remove(&component)
                .map(|set| set.into_iter().collect())
                .unwrap_or_default()
        });
        CELL_COMPONENTS.with(|map| {
            let mut map = map.borrow_mut();
            for cell in cells {
                if let Some(components) = map.get_mut(&cell) {
                    components.shift_remove(&component);
                }
            }
        });
    }

    /// Drop every dependency table and the redraw hook for this thread.
    ///
    /// This is the explicit isolation primitive a multi-session host calls
    /// between requests (together with `store::clear`).
    pub fn reset() {
        SUBSCRIBERS.with(|map| map.borrow_mut().clear());
        CELL_SUBSCRIBERS.with(|map| map.borrow_mut().clear());
        COMPONENT_CELLS.with(|map| map.borrow_mut().clear());
        CELL_COMPONENTS.with(|map| map.borrow_mut().clear());
        Self::clear_redraw_hook();
    }
}

/// Render a panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

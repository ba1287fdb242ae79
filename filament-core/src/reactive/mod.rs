//! Reactive primitives.
//!
//! This module implements the core reactive system: signals, derived cells,
//! effects, and the runtime that connects them to components.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. When a signal is read
//! within a tracking scope (a derived cell, an effect, or a component
//! render), it automatically registers that reader as a dependent. When the
//! value changes, dependents are notified synchronously.
//!
//! ## Derived cells
//!
//! A [`Derived`] is a read-only cell computed from other cells. Invalidation
//! is eager (an upstream change immediately flips the dirty flag and
//! cascades), recomputation is lazy (the compute function runs only on the
//! next read).
//!
//! ## Effects
//!
//! An [`Effect`] runs its body immediately and re-runs it whenever any cell
//! it read changes. Bodies may return a cleanup closure, invoked before each
//! re-run and on disposal.
//!
//! ## Runtime
//!
//! The [`Runtime`] owns the dependency tables, the bidirectional
//! component↔cell tracker, and the redraw-dispatch hook the renderer
//! collaborator installs. All of it is thread-local: the reactive model is
//! single-threaded and cooperative.
//!
//! This approach (automatic dependency tracking through an ambient scope)
//! is the one used by SolidJS, Vue 3, and Leptos.

mod context;
mod derived;
mod effect;
mod ids;
mod runtime;
mod signal;

pub use context::{ScopeKind, TrackingScope};
pub use derived::Derived;
pub use effect::{Cleanup, Effect};
pub use ids::{CellId, ComponentId, SubscriberId, SubscriptionId};
pub use runtime::{Reactive, RedrawHook, RenderScope, Runtime};
pub use signal::{Signal, WeakSignal};

pub(crate) use runtime::panic_message;

//! Dependency-collection context.
//!
//! The context tracks which computation (or rendering component) is currently
//! running. This enables automatic dependency tracking: when a cell is read,
//! we can register the current reader as a dependent.
//!
//! # Implementation
//!
//! A thread-local stack holds the currently executing scopes. Entering a
//! scope (running a derived computation, an effect, or a component render)
//! pushes an entry; the guard pops it on drop. Nested scopes (a derived cell
//! read from inside an effect) are supported naturally by the stack.
//!
//! Keeping this state thread-local rather than process-global means a host
//! running one logical session per thread gets isolation for free.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::ids::{CellId, ComponentId, SubscriberId};

/// What kind of reader is currently collecting dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A derived cell or effect, identified by its subscriber ID.
    Computation(SubscriberId),
    /// A component render, identified by its component ID.
    Component(ComponentId),
}

/// An entry in the tracking stack.
#[derive(Debug, Clone)]
struct ScopeEntry {
    scope: ScopeKind,
    /// Cells read during this scope, in read order.
    dependencies: SmallVec<[CellId; 8]>,
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<ScopeEntry>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the tracking scope when dropped.
///
/// Ensures the stack is properly unwound even if the computation panics.
pub struct TrackingScope {
    scope: ScopeKind,
}

impl TrackingScope {
    /// Enter a new dependency-collection scope.
    ///
    /// While the scope is active, any cell that is read registers itself
    /// against this scope. The scope exits when the guard is dropped.
    pub fn enter(scope: ScopeKind) -> Self {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(ScopeEntry {
                scope,
                dependencies: SmallVec::new(),
            });
        });

        Self { scope }
    }

    /// Check if any dependency-collection scope is active.
    pub fn is_active() -> bool {
        SCOPE_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the innermost active scope, if any.
    pub fn current() -> Option<ScopeKind> {
        SCOPE_STACK.with(|stack| stack.borrow().last().map(|entry| entry.scope))
    }

    /// Record that the current scope read the given cell.
    ///
    /// Called by cells when they are read. A no-op outside any scope.
    pub fn track_dependency(cell: CellId) {
        SCOPE_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if !entry.dependencies.contains(&cell) {
                    entry.dependencies.push(cell);
                }
            }
        });
    }

    /// Get the cells read so far in the current scope.
    pub fn dependencies() -> Vec<CellId> {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.to_vec())
                .unwrap_or_default()
        })
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catch mismatched push/pop pairs early in debug builds.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.scope, self.scope,
                    "TrackingScope mismatch: expected {:?}, got {:?}",
                    self.scope, entry.scope
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_tracks_current_reader() {
        let id = SubscriberId::new();

        assert!(!TrackingScope::is_active());
        assert!(TrackingScope::current().is_none());

        {
            let _scope = TrackingScope::enter(ScopeKind::Computation(id));

            assert!(TrackingScope::is_active());
            assert_eq!(
                TrackingScope::current(),
                Some(ScopeKind::Computation(id))
            );
        }

        assert!(!TrackingScope::is_active());
        assert!(TrackingScope::current().is_none());
    }

    #[test]
    fn scope_records_dependencies_once() {
        let id = SubscriberId::new();
        let _scope = TrackingScope::enter(ScopeKind::Computation(id));

        let a = CellId::new();
        let b = CellId::new();

        TrackingScope::track_dependency(a);
        TrackingScope::track_dependency(b);
        TrackingScope::track_dependency(a);

        assert_eq!(TrackingScope::dependencies(), vec![a, b]);
    }

    #[test]
    fn nested_scopes() {
        let outer = ComponentId::new();
        let inner = SubscriberId::new();

        {
            let _outer = TrackingScope::enter(ScopeKind::Component(outer));
            assert_eq!(TrackingScope::current(), Some(ScopeKind::Component(outer)));

            {
                let _inner = TrackingScope::enter(ScopeKind::Computation(inner));
                assert_eq!(
                    TrackingScope::current(),
                    Some(ScopeKind::Computation(inner))
                );
                TrackingScope::track_dependency(CellId::new());
                assert_eq!(TrackingScope::dependencies().len(), 1);
            }

            // Back to the outer scope with its own (empty) dependency list.
            assert_eq!(TrackingScope::current(), Some(ScopeKind::Component(outer)));
            assert!(TrackingScope::dependencies().is_empty());
        }

        assert!(TrackingScope::current().is_none());
    }
}

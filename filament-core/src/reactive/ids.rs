//! Identifier types for the reactive system.
//!
//! Cells, subscribers (derived cells and effects), components, and explicit
//! subscriptions each get a unique ID from an atomic counter. IDs are what
//! the runtime's dependency tables are keyed on, so a torn-down component or
//! a dropped effect never keeps a cell alive through the tables.

use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Generate a new unique ID.
            pub fn new() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(0);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }

            /// Get the raw ID value.
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

id_type! {
    /// Unique identifier for a reactive cell (signal or derived).
    CellId
}

id_type! {
    /// Unique identifier for a subscriber computation (derived cell or effect).
    SubscriberId
}

id_type! {
    /// Unique identifier for a UI component, assigned by the renderer
    /// collaborator when it begins tracking a component's reads.
    ComponentId
}

id_type! {
    /// Token returned by `subscribe`/`watch`, used to unsubscribe.
    SubscriptionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = CellId::new();
        let b = CellId::new();
        let c = CellId::new();

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn id_kinds_count_independently() {
        let cell = CellId::new();
        let sub = SubscriberId::new();
        // Separate counters: raw values may collide across kinds, the types
        // keep them apart.
        let _ = (cell.raw(), sub.raw());
    }
}

//! Filament Core
//!
//! This crate provides the fine-grained reactive state engine for the
//! Filament UI framework. It implements:
//!
//! - Reactive primitives (signals, derived cells, effects)
//! - Component ↔ cell dependency tracking with a redraw-dispatch hook
//! - A deep reactive membrane over JSON-shaped data
//! - A named store registry with snapshot serialization and restore
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `membrane`: Object/array wrapping that turns field access into cell
//!   access, including computed and accessor fields
//! - `store`: Name → root registry, snapshots, and the persistence
//!   transport boundary
//!
//! # Example
//!
//! ```
//! use filament_core::reactive::{Derived, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Derived::new(move || count.read() * 2)
//! };
//!
//! // Create an effect; it runs now and re-runs while the handle lives.
//! let effect = {
//!     let count = count.clone();
//!     let doubled = doubled.clone();
//!     Effect::new(move || {
//!         println!("Count: {}, Doubled: {}", count.read(), doubled.read());
//!     })
//! };
//! assert_eq!(effect.run_count(), 1);
//!
//! // Update the signal; the effect re-runs synchronously.
//! count.write(5);
//! assert_eq!(doubled.read(), 10);
//! ```

pub mod error;
pub mod membrane;
pub mod reactive;
pub mod store;

pub use error::Error;

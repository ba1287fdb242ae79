//! Store registry and snapshot transport.
//!
//! A "store" is a named membrane root. The registry tracks them so hosts
//! can snapshot the whole application state into plain JSON (derived
//! fields excluded, they recompute on the receiving side) and restore it
//! later, optionally through a key/value persistence transport.

mod registry;
mod transport;

pub use registry::{
    clear, deserialize, deserialize_all, get, get_template, names, register, serialize,
    serialize_all, unregister, StoreEntry,
};
pub use transport::{load_all, save_all, MemoryTransport, Transport};

//! Persistence transport boundary.
//!
//! Snapshots cross process boundaries as opaque JSON text through a plain
//! key/value interface. The core parses and stringifies the payload
//! itself; the transport never inspects it.

use serde_json::Value;

use super::registry;
use crate::error::Error;

/// Durable key/value medium for snapshot text.
pub trait Transport {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
}

/// In-memory transport, for tests and single-process hosts.
#[derive(Default)]
pub struct MemoryTransport {
    entries: std::collections::HashMap<String, String>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for MemoryTransport {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }
}

/// Serialize every registered store and write the combined snapshot under
/// `key`.
pub fn save_all<T: Transport>(transport: &mut T, key: &str) -> Result<(), Error> {
    let snapshot = registry::serialize_all();
    transport.set(key, serde_json::to_string(&snapshot)?);
    Ok(())
}

/// Read the combined snapshot under `key` (if present) and restore every
/// store it names.
pub fn load_all<T: Transport>(transport: &T, key: &str) -> Result<(), Error> {
    let Some(text) = transport.get(key) else {
        return Ok(());
    };
    let snapshot: Value = serde_json::from_str(&text)?;
    registry::deserialize_all(&snapshot)
}

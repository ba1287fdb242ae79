//! Error types for the reactive state engine.

use thiserror::Error;

/// Errors surfaced by membrane and store operations.
///
/// Subscriber, effect-body, and cleanup failures are not errors at this
/// level: they are caught at the point of invocation and logged, so they
/// never interrupt notification. The variants here are the synchronous,
/// caller-facing failures.
#[derive(Debug, Error)]
pub enum Error {
    /// Writing a field backed by a derived cell or a get-only accessor.
    #[error("field `{0}` is read-only")]
    ReadOnly(String),

    /// Registering a store under an empty name.
    #[error("store name must not be empty")]
    EmptyStoreName,

    /// Wrapping or registering a value that is not an object or array.
    #[error("expected an object or array value, got {0}")]
    NotWrappable(&'static str),

    /// Restoring from a snapshot that is not an object.
    #[error("snapshot must be a JSON object")]
    InvalidSnapshot,

    /// JSON parse or stringify failure at the transport boundary.
    #[error("transport payload error: {0}")]
    Json(#[from] serde_json::Error),
}

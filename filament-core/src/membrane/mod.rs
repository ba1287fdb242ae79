//! Deep reactive membrane over JSON-shaped data.
//!
//! Wrapping a plain object or array produces a membrane whose every field
//! (or element) is backed by its own reactive cell. Nested objects and
//! arrays become nested membranes recursively, dynamically added fields
//! are tracked like declared ones, and templates can declare computed and
//! accessor fields alongside plain values.
//!
//! ```
//! use filament_core::membrane::{ObjectMembrane, Template};
//! use serde_json::json;
//!
//! let root = ObjectMembrane::from_templates(
//!     [
//!         ("count".to_string(), Template::value(1)),
//!         (
//!             "doubled".to_string(),
//!             Template::computed(|m: &ObjectMembrane| {
//!                 json!(m.get("count").as_i64().unwrap_or(0) * 2)
//!             }),
//!         ),
//!     ]
//!     .into_iter()
//!     .collect(),
//! );
//!
//! root.set("count", json!(21)).unwrap();
//! assert_eq!(root.get("doubled").as_i64(), Some(42));
//! ```

mod array;
mod object;
mod template;
mod value;

pub use array::ArrayMembrane;
pub use object::{ObjectMembrane, WeakObjectMembrane};
pub use template::{ComputeFn, SetterFn, Template};
pub use value::FieldValue;

use serde_json::Value;

use crate::error::Error;
use crate::reactive::{Derived, Signal, SubscriptionId};

/// Reserved field-name prefix meaning "give me the raw cell, not its
/// unwrapped value".
pub const SIGNAL_PREFIX: &str = "$";

/// A membrane over either shape of JSON container.
#[derive(Clone, PartialEq, Debug)]
pub enum Membrane {
    Object(ObjectMembrane),
    Array(ArrayMembrane),
}

impl Membrane {
    /// Wrap a plain JSON object or array. Scalars are not wrappable; they
    /// live inside cells, not behind membranes.
    pub fn wrap(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(map) => Ok(Membrane::Object(ObjectMembrane::from_map(map))),
            Value::Array(items) => Ok(Membrane::Array(ArrayMembrane::from_values(items))),
            other => Err(Error::NotWrappable(value::json_kind(&other))),
        }
    }

    /// Identity comparison: do two handles wrap the same structure?
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Membrane::Object(a), Membrane::Object(b)) => a.ptr_eq(b),
            (Membrane::Array(a), Membrane::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectMembrane> {
        match self {
            Membrane::Object(obj) => Some(obj),
            Membrane::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayMembrane> {
        match self {
            Membrane::Array(arr) => Some(arr),
            Membrane::Object(_) => None,
        }
    }

    /// Deep-unwrap into plain JSON; see [`ObjectMembrane::to_json`].
    pub fn to_json(&self) -> Value {
        match self {
            Membrane::Object(obj) => obj.to_json(),
            Membrane::Array(arr) => arr.to_json(),
        }
    }
}

/// The cell backing a field, as returned by raw (`$`-prefixed) access.
#[derive(Clone)]
pub enum FieldCell {
    Signal(Signal<FieldValue>),
    Derived(Derived<FieldValue>),
}

impl FieldCell {
    /// Read the cell's value, registering a dependency.
    pub fn read(&self) -> FieldValue {
        match self {
            FieldCell::Signal(sig) => sig.read(),
            FieldCell::Derived(d) => d.read(),
        }
    }

    /// Read without registering a dependency. A never-computed derived cell
    /// peeks as absent.
    pub fn peek(&self) -> FieldValue {
        match self {
            FieldCell::Signal(sig) => sig.peek(),
            FieldCell::Derived(d) => d.peek().unwrap_or(FieldValue::Absent),
        }
    }

    /// Register a `(new, old)` callback on the cell.
    pub fn watch<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&FieldValue, &FieldValue) + Send + Sync + 'static,
    {
        match self {
            FieldCell::Signal(sig) => sig.watch(callback),
            FieldCell::Derived(d) => d.watch(callback),
        }
    }

    /// Remove a previously registered callback.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        match self {
            FieldCell::Signal(sig) => sig.unsubscribe(id),
            FieldCell::Derived(d) => d.unsubscribe(id),
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, FieldCell::Derived(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrap_accepts_containers_only() {
        assert!(Membrane::wrap(json!({"a": 1})).is_ok());
        assert!(Membrane::wrap(json!([1, 2])).is_ok());
        assert!(matches!(
            Membrane::wrap(json!(42)),
            Err(Error::NotWrappable("number"))
        ));
        assert!(matches!(
            Membrane::wrap(json!(null)),
            Err(Error::NotWrappable("null"))
        ));
    }

    #[test]
    fn deep_unwrap_reconstructs_the_shape() {
        let source = json!({
            "name": "todos",
            "items": [{"done": false, "text": "write"}, {"done": true, "text": "read"}],
            "meta": {"version": 2}
        });
        let membrane = Membrane::wrap(source.clone()).unwrap();
        assert_eq!(membrane.to_json(), source);
    }

    #[test]
    fn cycles_unwrap_as_null() {
        let root = ObjectMembrane::from_map(json!({"a": 1}).as_object().unwrap().clone());
        let child = ObjectMembrane::from_map(serde_json::Map::new());

        // Wire a cycle directly through the field cells.
        child
            .set("parent", json!(null))
            .unwrap();
        match child.raw("parent").unwrap() {
            FieldCell::Signal(sig) => {
                sig.write(FieldValue::Nested(Membrane::Object(root.clone())))
            }
            _ => panic!("parent should be plain"),
        }
        match {
            root.set("child", json!(null)).unwrap();
            root.raw("child").unwrap()
        } {
            FieldCell::Signal(sig) => {
                sig.write(FieldValue::Nested(Membrane::Object(child.clone())))
            }
            _ => panic!("child should be plain"),
        }

        let out = root.to_json();
        assert_eq!(out["a"], json!(1));
        assert_eq!(out["child"]["parent"], json!(null));
    }
}

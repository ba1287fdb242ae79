//! Field values.
//!
//! A membrane field's cell holds a [`FieldValue`]: either nothing (a deleted
//! or never-assigned field), a plain JSON scalar, or a nested membrane for
//! object/array-shaped values. Equality is the strict equality the change
//! check uses: scalars compare by value, nested membranes by identity.

use std::collections::HashSet;

use serde_json::Value;

use super::{ArrayMembrane, Membrane, ObjectMembrane};
use crate::reactive::Signal;

/// The value held by a membrane field's cell.
#[derive(Clone, Debug)]
pub enum FieldValue {
    /// The field was deleted or never assigned.
    Absent,
    /// A JSON scalar (null, bool, number, or string).
    Plain(Value),
    /// An object or array value, wrapped for deep reactivity.
    Nested(Membrane),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Absent, FieldValue::Absent) => true,
            (FieldValue::Plain(a), FieldValue::Plain(b)) => a == b,
            // Identity: a freshly wrapped structure is never "the same value".
            (FieldValue::Nested(a), FieldValue::Nested(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Plain(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Plain(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Plain(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Plain(v) => v.as_str(),
            _ => None,
        }
    }

    /// The nested membrane, if this value is object- or array-shaped.
    pub fn as_membrane(&self) -> Option<&Membrane> {
        match self {
            FieldValue::Nested(m) => Some(m),
            _ => None,
        }
    }

    /// Deep-unwrap into a plain JSON value.
    ///
    /// `Absent` becomes `null`; nested membranes are walked recursively with
    /// cycle breaking (a revisited structure becomes `null`).
    pub fn to_json(&self) -> Value {
        self.to_plain(&mut HashSet::new())
    }

    pub(crate) fn to_plain(&self, visited: &mut HashSet<usize>) -> Value {
        match self {
            FieldValue::Absent => Value::Null,
            FieldValue::Plain(v) => v.clone(),
            FieldValue::Nested(Membrane::Object(obj)) => obj.to_plain(visited),
            FieldValue::Nested(Membrane::Array(arr)) => arr.to_plain(visited),
        }
    }
}

/// Wrap a plain JSON value into a field value, building nested membranes
/// for objects and arrays.
pub(crate) fn wrap_value(value: Value) -> FieldValue {
    match value {
        Value::Object(map) => {
            FieldValue::Nested(Membrane::Object(ObjectMembrane::from_map(map)))
        }
        Value::Array(items) => {
            FieldValue::Nested(Membrane::Array(ArrayMembrane::from_values(items)))
        }
        scalar => FieldValue::Plain(scalar),
    }
}

/// Wrap a plain JSON value into a fresh cell, registering the cell as owner
/// of an array-shaped value so in-place mutation can notify it.
pub(crate) fn wrap_into_signal(value: Value) -> Signal<FieldValue> {
    let signal = Signal::new(wrap_value(value));
    hook_owner(&signal);
    signal
}

/// If `signal` currently holds an array membrane, register it as the array's
/// owner cell.
pub(crate) fn hook_owner(signal: &Signal<FieldValue>) {
    if let FieldValue::Nested(Membrane::Array(arr)) = signal.peek() {
        arr.set_owner(signal.downgrade());
    }
}

/// Wrap a plain JSON value and write it into `cell`. An array-shaped value
/// gets `cell` registered as its owner before the write, so subscribers
/// notified by the write can already mutate the array through its owner.
pub(crate) fn write_wrapped(cell: &Signal<FieldValue>, value: Value) {
    let wrapped = wrap_value(value);
    if let FieldValue::Nested(Membrane::Array(arr)) = &wrapped {
        arr.set_owner(cell.downgrade());
    }
    cell.write(wrapped);
}

/// Human-readable JSON kind for error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_compare_by_value() {
        assert_eq!(
            wrap_value(json!(1)),
            FieldValue::Plain(json!(1))
        );
        assert_ne!(wrap_value(json!(1)), wrap_value(json!(2)));
        assert_eq!(FieldValue::Absent, FieldValue::Absent);
        assert_ne!(FieldValue::Absent, FieldValue::Plain(Value::Null));
    }

    #[test]
    fn nested_values_compare_by_identity() {
        let a = wrap_value(json!({"x": 1}));
        let b = wrap_value(json!({"x": 1}));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn wrapped_arrays_get_an_owner_cell() {
        let signal = wrap_into_signal(json!([1, 2, 3]));
        match signal.peek() {
            FieldValue::Nested(Membrane::Array(arr)) => {
                assert!(arr.owner().is_some());
            }
            other => panic!("expected array membrane, got {:?}", other),
        }
    }

    #[test]
    fn to_json_round_trips_scalars() {
        assert_eq!(wrap_value(json!("hi")).to_json(), json!("hi"));
        assert_eq!(FieldValue::Absent.to_json(), Value::Null);
    }
}

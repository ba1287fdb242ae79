//! Array-shaped membrane.
//!
//! Holds an ordered sequence of element cells plus a back-reference to the
//! cell whose value the array is (the "owner" cell). Structural mutation
//! (push, splice, length assignment, ...) notifies the owner cell's
//! subscribers exactly once per call, which also drives the redraw hook
//! once for that cell; element reads register dependencies on the element
//! cells only.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use super::template::Template;
use super::value::{wrap_into_signal, FieldValue};
use super::Membrane;
use crate::error::Error;
use crate::reactive::{Signal, WeakSignal};

struct ArrayInner {
    elements: RwLock<Vec<Signal<FieldValue>>>,
    /// The cell whose value this membrane is. Weak so an array does not
    /// keep its enclosing cell alive.
    owner: RwLock<Option<WeakSignal<FieldValue>>>,
}

/// Array-shaped reactive membrane. Cloning produces another handle to the
/// same wrapped array.
#[derive(Clone)]
pub struct ArrayMembrane {
    inner: Arc<ArrayInner>,
}

impl ArrayMembrane {
    /// Wrap a plain JSON array. Elements are wrapped eagerly, the same way
    /// object-field assignment wraps values.
    pub fn from_values(items: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                elements: RwLock::new(items.into_iter().map(wrap_into_signal).collect()),
                owner: RwLock::new(None),
            }),
        }
    }

    /// Build from element templates. Computed and accessor templates have
    /// no meaning at array positions and collapse to `null`.
    pub fn from_templates(elements: Vec<Template>) -> Self {
        let items = elements
            .into_iter()
            .map(|t| match t {
                Template::Value(v) => wrap_into_signal(v),
                Template::Object(fields) => wrap_object_template(fields),
                Template::Array(inner) => {
                    let arr = ArrayMembrane::from_templates(inner);
                    let sig = Signal::new(FieldValue::Nested(Membrane::Array(arr.clone())));
                    arr.set_owner(sig.downgrade());
                    sig
                }
                Template::Computed(_) | Template::Accessor { .. } => {
                    warn!("computed templates are not supported at array positions");
                    wrap_into_signal(Value::Null)
                }
            })
            .collect();
        Self {
            inner: Arc::new(ArrayInner {
                elements: RwLock::new(items),
                owner: RwLock::new(None),
            }),
        }
    }

    /// Register the cell whose value this array is.
    pub(crate) fn set_owner(&self, owner: WeakSignal<FieldValue>) {
        *self.inner.owner.write() = Some(owner);
    }

    pub(crate) fn ptr_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn owner_signal(&self) -> Option<Signal<FieldValue>> {
        self.inner.owner.read().clone().and_then(|w| w.upgrade())
    }

    /// The cell whose value this array currently is, if one is registered
    /// and still alive.
    pub fn owner(&self) -> Option<Signal<FieldValue>> {
        self.owner_signal()
    }

    /// Notify the owner cell once. Every structural mutator ends with
    /// exactly one call to this.
    fn touch_owner(&self) {
        if let Some(owner) = self.owner_signal() {
            owner.touch();
        }
    }

    /// Live element count. Registers a dependency on the owner cell so a
    /// length read re-fires on structural mutation.
    pub fn len(&self) -> usize {
        if let Some(owner) = self.owner_signal() {
            owner.track();
        }
        self.inner.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the element at `index`, registering a dependency on its cell.
    /// Out-of-bounds reads are absent, not errors.
    pub fn get(&self, index: usize) -> FieldValue {
        let cell = self.inner.elements.read().get(index).cloned();
        match cell {
            Some(sig) => sig.read(),
            None => FieldValue::Absent,
        }
    }

    /// Read an element and deep-unwrap it into plain JSON.
    pub fn get_json(&self, index: usize) -> Value {
        self.get(index).to_json()
    }

    /// Raw cell access for an element. Returns `None` out of bounds.
    pub fn raw(&self, index: usize) -> Option<Signal<FieldValue>> {
        self.inner.elements.read().get(index).cloned()
    }

    /// Assign the element at `index`, wrapping objects and arrays into
    /// nested membranes. Assigning past the end pads the gap with `null`.
    /// Counts as structural mutation: the owner cell is notified once.
    pub fn set(&self, index: usize, value: Value) {
        let cell = {
            let mut elements = self.inner.elements.write();
            while elements.len() <= index {
                elements.push(wrap_into_signal(Value::Null));
            }
            elements[index].clone()
        };
        super::value::write_wrapped(&cell, value);
        self.touch_owner();
    }

    /// Resize the array, truncating or padding with `null`. Counts as
    /// structural mutation even when the length is unchanged.
    pub fn set_len(&self, len: usize) {
        {
            let mut elements = self.inner.elements.write();
            if len < elements.len() {
                elements.truncate(len);
            } else {
                while elements.len() < len {
                    elements.push(wrap_into_signal(Value::Null));
                }
            }
        }
        self.touch_owner();
    }

    /// Append an element.
    pub fn push(&self, value: Value) {
        self.inner.elements.write().push(wrap_into_signal(value));
        self.touch_owner();
    }

    /// Remove and return the last element, unwrapped. Popping an empty
    /// array is a no-op.
    pub fn pop(&self) -> Option<FieldValue> {
        let removed = self.inner.elements.write().pop()?;
        self.touch_owner();
        Some(removed.peek())
    }

    /// Remove and return the first element, unwrapped.
    pub fn shift(&self) -> Option<FieldValue> {
        let removed = {
            let mut elements = self.inner.elements.write();
            if elements.is_empty() {
                None
            } else {
                Some(elements.remove(0))
            }
        };
        let removed = removed?;
        self.touch_owner();
        Some(removed.peek())
    }

    /// Prepend an element.
    pub fn unshift(&self, value: Value) {
        self.inner.elements.write().insert(0, wrap_into_signal(value));
        self.touch_owner();
    }

    /// Insert an element at `index` (clamped to the end).
    pub fn insert(&self, index: usize, value: Value) {
        {
            let mut elements = self.inner.elements.write();
            let index = index.min(elements.len());
            elements.insert(index, wrap_into_signal(value));
        }
        self.touch_owner();
    }

    /// Remove and return the element at `index`, unwrapped. Out-of-bounds
    /// removals are `None`, not errors.
    pub fn remove(&self, index: usize) -> Option<FieldValue> {
        let removed = {
            let mut elements = self.inner.elements.write();
            if index < elements.len() {
                Some(elements.remove(index))
            } else {
                None
            }
        };
        let removed = removed?;
        self.touch_owner();
        Some(removed.peek())
    }

    /// Remove `delete_count` elements starting at `start`, inserting
    /// `replacements` in their place. Returns the removed values,
    /// unwrapped. Indices past the end are clamped.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        replacements: Vec<Value>,
    ) -> Vec<FieldValue> {
        let removed: Vec<Signal<FieldValue>> = {
            let mut elements = self.inner.elements.write();
            let start = start.min(elements.len());
            let end = start.saturating_add(delete_count).min(elements.len());
            elements
                .splice(start..end, replacements.into_iter().map(wrap_into_signal))
                .collect()
        };
        self.touch_owner();
        removed.into_iter().map(|sig| sig.peek()).collect()
    }

    /// Reverse the element order in place.
    pub fn reverse(&self) {
        self.inner.elements.write().reverse();
        self.touch_owner();
    }

    /// Sort elements in place with a comparator over unwrapped values.
    /// The comparator runs with no lock held, so it may read the array.
    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&FieldValue, &FieldValue) -> std::cmp::Ordering,
    {
        let mut cells: Vec<(Signal<FieldValue>, FieldValue)> = self
            .inner
            .elements
            .read()
            .iter()
            .map(|sig| (sig.clone(), sig.peek()))
            .collect();
        cells.sort_by(|a, b| compare(&a.1, &b.1));
        *self.inner.elements.write() = cells.into_iter().map(|(sig, _)| sig).collect();
        self.touch_owner();
    }

    /// Overwrite the elements in `start..end` (clamped) with `value`.
    pub fn fill(&self, value: Value, start: usize, end: usize) {
        let cells: Vec<Signal<FieldValue>> = {
            let elements = self.inner.elements.read();
            let start = start.min(elements.len());
            let end = end.min(elements.len());
            elements[start..end].to_vec()
        };
        for cell in cells {
            super::value::write_wrapped(&cell, value.clone());
        }
        self.touch_owner();
    }

    /// Copy the values in `src..src_end` (clamped) to positions starting at
    /// `dest`, overwriting. Lengths never change.
    pub fn copy_within(&self, src: usize, src_end: usize, dest: usize) {
        let moves: Vec<(Signal<FieldValue>, FieldValue)> = {
            let elements = self.inner.elements.read();
            let len = elements.len();
            let src = src.min(len);
            let src_end = src_end.min(len);
            (src..src_end)
                .filter_map(|i| {
                    let target = dest + (i - src);
                    if target < len {
                        Some((elements[target].clone(), elements[i].peek()))
                    } else {
                        None
                    }
                })
                .collect()
        };
        for (cell, value) in moves {
            cell.write(value);
        }
        self.touch_owner();
    }

    /// Unwrapped element values, reading each element cell (so iteration
    /// registers per-element dependencies, not an owner-cell dependency).
    pub fn to_vec(&self) -> Vec<FieldValue> {
        let cells: Vec<Signal<FieldValue>> = self.inner.elements.read().clone();
        cells.into_iter().map(|sig| sig.read()).collect()
    }

    /// Whether any element's unwrapped value equals `value`.
    pub fn contains(&self, value: &Value) -> bool {
        self.to_vec()
            .iter()
            .any(|v| matches!(v, FieldValue::Plain(p) if p == value))
    }

    /// Deep-unwrap into a plain JSON array, breaking cycles as `null`.
    pub fn to_json(&self) -> Value {
        self.to_plain(&mut HashSet::new())
    }

    pub(crate) fn to_plain(&self, visited: &mut HashSet<usize>) -> Value {
        if !visited.insert(self.ptr_id()) {
            return Value::Null;
        }
        let cells: Vec<Signal<FieldValue>> = self.inner.elements.read().clone();
        Value::Array(
            cells
                .into_iter()
                .map(|sig| sig.peek().to_plain(visited))
                .collect(),
        )
    }

    /// Restore element values from a plain snapshot, recursing into nested
    /// structure where shapes line up and rebuilding elements where they
    /// do not. A length change counts as structural mutation.
    pub(crate) fn restore_elements(&self, items: &[Value]) -> Result<(), Error> {
        let existing: Vec<Signal<FieldValue>> = self.inner.elements.read().clone();
        let mut structural = existing.len() != items.len();

        for (i, incoming) in items.iter().enumerate() {
            match existing.get(i) {
                Some(cell) => match (cell.peek(), incoming) {
                    (FieldValue::Nested(Membrane::Object(obj)), Value::Object(_)) => {
                        obj.restore(incoming)?;
                    }
                    (FieldValue::Nested(Membrane::Array(arr)), Value::Array(nested)) => {
                        arr.restore_elements(nested)?;
                    }
                    _ => {
                        super::value::write_wrapped(cell, incoming.clone());
                    }
                },
                None => {
                    self.inner
                        .elements
                        .write()
                        .push(wrap_into_signal(incoming.clone()));
                    structural = true;
                }
            }
        }
        if items.len() < existing.len() {
            self.inner.elements.write().truncate(items.len());
        }
        if structural {
            self.touch_owner();
        }
        Ok(())
    }
}

fn wrap_object_template(
    fields: indexmap::IndexMap<String, Template>,
) -> Signal<FieldValue> {
    Signal::new(FieldValue::Nested(Membrane::Object(
        super::ObjectMembrane::from_templates(fields),
    )))
}

impl PartialEq for ArrayMembrane {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl std::fmt::Debug for ArrayMembrane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayMembrane")
            .field("len", &self.inner.elements.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn owned_array(items: Vec<Value>) -> (ArrayMembrane, Signal<FieldValue>) {
        let arr = ArrayMembrane::from_values(items);
        let owner = Signal::new(FieldValue::Nested(Membrane::Array(arr.clone())));
        arr.set_owner(owner.downgrade());
        (arr, owner)
    }

    fn count_touches(owner: &Signal<FieldValue>) -> Arc<AtomicI32> {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        owner.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        calls
    }

    #[test]
    fn elements_read_unwrapped() {
        let (arr, _owner) = owned_array(vec![json!(1), json!("two"), json!(null)]);

        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(0).as_i64(), Some(1));
        assert_eq!(arr.get(1).as_str(), Some("two"));
        assert!(arr.get(9).is_absent());
        assert_eq!(arr.to_json(), json!([1, "two", null]));
    }

    #[test]
    fn push_notifies_owner_once() {
        let (arr, owner) = owned_array(vec![json!(1)]);
        let calls = count_touches(&owner);

        arr.push(json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(arr.to_json(), json!([1, 2]));
    }

    #[test]
    fn splice_notifies_owner_once_per_call() {
        let (arr, owner) = owned_array(vec![json!(1), json!(2), json!(3)]);
        let calls = count_touches(&owner);

        let removed = arr.splice(1, 1, vec![json!(9), json!(9)]);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].as_i64(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(arr.to_json(), json!([1, 9, 9, 3]));
    }

    #[test]
    fn index_set_past_end_pads_with_null() {
        let (arr, owner) = owned_array(vec![json!(1)]);
        let calls = count_touches(&owner);

        arr.set(3, json!("x"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(arr.to_json(), json!([1, null, null, "x"]));
    }

    #[test]
    fn index_set_and_length_match_push_notifications() {
        let (by_push, push_owner) = owned_array(vec![json!(1), json!(2)]);
        let (by_index, index_owner) = owned_array(vec![json!(1), json!(2)]);
        let push_calls = count_touches(&push_owner);
        let index_calls = count_touches(&index_owner);

        by_push.push(json!(3));

        let old_len = by_index.inner.elements.read().len();
        by_index.set(old_len, json!(3));
        by_index.set_len(old_len + 1);

        assert_eq!(push_calls.load(Ordering::SeqCst), 1);
        assert_eq!(index_calls.load(Ordering::SeqCst), 2);
        assert_eq!(by_push.to_json(), by_index.to_json());
    }

    #[test]
    fn shift_unshift_pop_move_both_ends() {
        let (arr, owner) = owned_array(vec![json!(1), json!(2), json!(3)]);
        let calls = count_touches(&owner);

        assert_eq!(arr.shift().unwrap().as_i64(), Some(1));
        arr.unshift(json!(0));
        assert_eq!(arr.pop().unwrap().as_i64(), Some(3));

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(arr.to_json(), json!([0, 2]));
    }

    #[test]
    fn insert_and_remove_at_arbitrary_positions() {
        let (arr, owner) = owned_array(vec![json!(1), json!(3)]);
        let calls = count_touches(&owner);

        arr.insert(1, json!(2));
        assert_eq!(arr.to_json(), json!([1, 2, 3]));

        assert_eq!(arr.remove(0).unwrap().as_i64(), Some(1));
        assert!(arr.remove(99).is_none());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(arr.to_json(), json!([2, 3]));
    }

    #[test]
    fn reverse_and_sort_reorder_in_place() {
        let (arr, owner) = owned_array(vec![json!(3), json!(1), json!(2)]);
        let calls = count_touches(&owner);

        arr.reverse();
        assert_eq!(arr.to_json(), json!([2, 1, 3]));

        arr.sort_by(|a, b| a.as_i64().cmp(&b.as_i64()));
        assert_eq!(arr.to_json(), json!([1, 2, 3]));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fill_and_copy_within_overwrite_values() {
        let (arr, owner) = owned_array(vec![json!(1), json!(2), json!(3), json!(4)]);
        let calls = count_touches(&owner);

        arr.fill(json!(0), 1, 3);
        assert_eq!(arr.to_json(), json!([1, 0, 0, 4]));

        arr.copy_within(0, 2, 2);
        assert_eq!(arr.to_json(), json!([1, 0, 1, 0]));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn object_elements_become_nested_membranes() {
        let (arr, _owner) = owned_array(vec![json!({"done": false})]);

        let item = match arr.get(0) {
            FieldValue::Nested(Membrane::Object(obj)) => obj,
            other => panic!("expected nested object, got {:?}", other),
        };
        item.set("done", json!(true)).unwrap();
        assert_eq!(arr.to_json(), json!([{"done": true}]));
    }

    #[test]
    fn length_reads_track_the_owner_cell() {
        let (arr, owner) = owned_array(vec![json!(1)]);

        let lens = Arc::new(AtomicI32::new(0));
        let lens_clone = lens.clone();
        let arr_clone = arr.clone();
        owner.subscribe(move |_| {
            lens_clone.store(arr_clone.inner.elements.read().len() as i32, Ordering::SeqCst);
        });

        arr.push(json!(2));
        arr.push(json!(3));
        assert_eq!(lens.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn truncating_length_drops_elements() {
        let (arr, owner) = owned_array(vec![json!(1), json!(2), json!(3)]);
        let calls = count_touches(&owner);

        arr.set_len(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(arr.to_json(), json!([1]));
        assert!(arr.get(2).is_absent());
    }
}
